//! Scripted code-generation service (testing only)
//!
//! `ScriptedCodeGen` answers each prompt from a per-kind queue, falls back to a
//! sticky per-kind reply once the queue is drained, and records every request
//! so tests can assert on prompt contents and call counts.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CodeGenError, CodeGenService, GenerationRequest, PromptKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ReplyGroup {
    Assessment,
    Generation,
    Correction,
    Enhancement,
}

impl From<PromptKind> for ReplyGroup {
    fn from(kind: PromptKind) -> Self {
        match kind {
            PromptKind::Assessment => ReplyGroup::Assessment,
            PromptKind::Generation => ReplyGroup::Generation,
            PromptKind::Correction(_) => ReplyGroup::Correction,
            PromptKind::Enhancement => ReplyGroup::Enhancement,
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Fail(String),
}

/// In-memory service that replays scripted replies.
///
/// Correction prompts of every fault kind share one queue; pass any
/// `PromptKind::Correction(_)` to address it.
#[derive(Debug, Default)]
pub struct ScriptedCodeGen {
    queued: Mutex<HashMap<ReplyGroup, VecDeque<ScriptedReply>>>,
    sticky: Mutex<HashMap<ReplyGroup, ScriptedReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedCodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service whose every reply is unusable prose.
    pub fn unparsable() -> Self {
        let svc = Self::new();
        for kind in [
            PromptKind::Assessment,
            PromptKind::Generation,
            PromptKind::Correction(crate::runtime::FaultKind::Syntax),
            PromptKind::Enhancement,
        ] {
            svc.always(kind, "I'm sorry, I can't help with that ~~~ {{{");
        }
        svc
    }

    /// Queue one reply for `kind`.
    pub fn push(&self, kind: PromptKind, reply: impl Into<String>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(kind.into())
            .or_default()
            .push_back(ScriptedReply::Text(reply.into()));
        self
    }

    /// Queue one service failure for `kind`.
    pub fn push_failure(&self, kind: PromptKind, message: impl Into<String>) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(kind.into())
            .or_default()
            .push_back(ScriptedReply::Fail(message.into()));
        self
    }

    /// Reply used for `kind` whenever its queue is empty.
    pub fn always(&self, kind: PromptKind, reply: impl Into<String>) -> &Self {
        self.sticky
            .lock()
            .unwrap()
            .insert(kind.into(), ScriptedReply::Text(reply.into()));
        self
    }

    /// Failure used for `kind` whenever its queue is empty.
    pub fn always_fail(&self, kind: PromptKind, message: impl Into<String>) -> &Self {
        self.sticky
            .lock()
            .unwrap()
            .insert(kind.into(), ScriptedReply::Fail(message.into()));
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests whose kind falls in the same group as `kind`.
    pub fn calls_of(&self, kind: PromptKind) -> usize {
        let group = ReplyGroup::from(kind);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| ReplyGroup::from(r.kind) == group)
            .count()
    }
}

#[async_trait]
impl CodeGenService for ScriptedCodeGen {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, CodeGenError> {
        self.requests.lock().unwrap().push(request.clone());
        let group = ReplyGroup::from(request.kind);

        let reply = {
            let mut queued = self.queued.lock().unwrap();
            queued.get_mut(&group).and_then(VecDeque::pop_front)
        }
        .or_else(|| self.sticky.lock().unwrap().get(&group).cloned());

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(CodeGenError::Http(message)),
            None => Err(CodeGenError::Malformed(format!(
                "no scripted reply for {:?}",
                request.kind
            ))),
        }
    }
}
