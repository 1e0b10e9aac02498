//! Gap assessment: decide whether a request needs a synthesized capability.
//!
//! A static allow-list answers common requests without any service call.
//! Everything else is put to the code-generation service, whose verdict is
//! parsed leniently. Unusable answers degrade to a conservative default that
//! is never cached, so a later call may still get a real verdict.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codegen::extract::extract_json_payload;
use crate::codegen::{CodeGenService, GenerationRequest, PromptKind};
use crate::domain::{AssessmentSource, CapabilityRequest, GapAssessment, RequestKey};
use crate::prompts;

/// Requests containing any of these phrases are served by built-in actions.
pub const ALLOW_LIST: &[&str] = &[
    "open",
    "launch",
    "start",
    "close",
    "quit",
    "exit",
    "create file",
    "delete file",
    "edit file",
    "find file",
    "search file",
    "list files",
    "show files",
    "display files",
    "run command",
    "execute",
    "terminal",
    "bash",
    "shell",
    "system info",
    "system status",
    "date",
    "time",
    "help",
    "what can you do",
    "capabilities",
];

/// Case-insensitive substring match against [`ALLOW_LIST`].
pub fn matches_allow_list(text: &str) -> bool {
    let lower = text.to_lowercase();
    ALLOW_LIST.iter().any(|phrase| lower.contains(phrase))
}

pub struct GapAssessor {
    service: Arc<dyn CodeGenService>,
    cache: HashMap<RequestKey, GapAssessment>,
}

impl GapAssessor {
    pub fn new(service: Arc<dyn CodeGenService>) -> Self {
        Self {
            service,
            cache: HashMap::new(),
        }
    }

    /// Assess `request`, consulting the cache first.
    ///
    /// `existing` lists capabilities already registered; `digest` is the
    /// trajectory digest from earlier iterations, used only on a cache miss.
    pub async fn assess(
        &mut self,
        request: &CapabilityRequest,
        existing: &[String],
        digest: Option<&str>,
    ) -> GapAssessment {
        let key = request.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!(request = %key.text, "assessment cache hit");
            return hit.clone();
        }

        if matches_allow_list(&request.text) {
            info!(request = %request.text, "allow-list fast path");
            let verdict = GapAssessment::fast_path();
            self.cache.insert(key, verdict.clone());
            return verdict;
        }

        let verdict = self.ask_service(request, existing, digest).await;
        if verdict.source != AssessmentSource::Fallback {
            self.cache.insert(key, verdict.clone());
        }
        verdict
    }

    async fn ask_service(
        &self,
        request: &CapabilityRequest,
        existing: &[String],
        digest: Option<&str>,
    ) -> GapAssessment {
        let prompt = prompts::assessment(request, existing, digest);
        let reply = match self
            .service
            .complete(&GenerationRequest::new(PromptKind::Assessment, prompt))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "assessment request failed");
                return GapAssessment::fallback("Assessment failed");
            }
        };

        if reply.trim().is_empty() {
            warn!("empty assessment response");
            return GapAssessment::fallback("Empty response");
        }

        let Some(payload) = extract_json_payload(&reply) else {
            warn!(reply_len = reply.len(), "assessment response is not JSON");
            return GapAssessment::fallback("JSON parsing failed");
        };

        match GapAssessment::from_payload(&payload) {
            Ok(verdict) => {
                info!(
                    can_handle = verdict.can_handle,
                    confidence = verdict.confidence,
                    missing = ?verdict.missing_capability,
                    "capability assessment"
                );
                verdict
            }
            Err(reason) => {
                warn!(%reason, "incomplete assessment response");
                GapAssessment::fallback(reason)
            }
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::fakes::ScriptedCodeGen;

    #[test]
    fn allow_list_is_case_insensitive() {
        assert!(matches_allow_list("Open Chrome"));
        assert!(matches_allow_list("please LIST FILES in downloads"));
        assert!(!matches_allow_list("generate a QR code for this URL and save it as PNG"));
    }

    #[tokio::test]
    async fn fallback_verdicts_are_not_cached() {
        let svc = Arc::new(ScriptedCodeGen::new());
        svc.push(PromptKind::Assessment, "no idea");
        svc.push(
            PromptKind::Assessment,
            r#"{"can_handle": false, "confidence": 0.8, "missing_capability": "qr", "required_functions": []}"#,
        );
        let mut gap = GapAssessor::new(svc.clone());
        let req = CapabilityRequest::new("make a qr code", ["search_web"]);

        let first = gap.assess(&req, &[], None).await;
        assert!(first.is_fallback());
        assert_eq!(gap.cache_len(), 0);

        let second = gap.assess(&req, &[], None).await;
        assert_eq!(second.source, AssessmentSource::Service);
        assert_eq!(gap.cache_len(), 1);
        assert_eq!(svc.call_count(), 2);
    }

    #[tokio::test]
    async fn service_error_falls_back() {
        let svc = Arc::new(ScriptedCodeGen::new());
        svc.push_failure(PromptKind::Assessment, "connection refused");
        let mut gap = GapAssessor::new(svc);
        let verdict = gap
            .assess(&CapabilityRequest::new("make a qr code", Vec::<String>::new()), &[], None)
            .await;
        assert!(verdict.can_handle);
        assert_eq!(verdict.missing_capability.as_deref(), Some("Assessment failed"));
    }
}
