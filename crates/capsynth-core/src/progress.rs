//! Coarse progress reporting for orchestrator runs.
//!
//! Sinks are called inline at each phase transition. Handing updates to
//! another execution context is the sink's business; the channel sink below
//! does that for UI consumers.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// One human-readable status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Machine-friendly stage tag, e.g. `initialization`, `iteration_2`, `testing`.
    pub stage: String,
    pub message: String,
    pub iteration: Option<u32>,
    pub max_iterations: u32,
}

impl ProgressUpdate {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            iteration: None,
            max_iterations: 0,
        }
    }

    pub fn at(mut self, iteration: u32, max_iterations: u32) -> Self {
        self.iteration = Some(iteration);
        self.max_iterations = max_iterations;
        self
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

impl ProgressSink for UnboundedSender<ProgressUpdate> {
    fn report(&self, update: ProgressUpdate) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.send(update);
    }
}
