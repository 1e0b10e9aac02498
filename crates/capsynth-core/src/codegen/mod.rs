//! Code-generation service boundary.
//!
//! Every prompt the subsystem sends (assessment, generation, correction,
//! enhancement) goes through [`CodeGenService`]. Responses are free text; the
//! [`extract`] helpers pull fenced source blocks or structured payloads out of
//! them and tolerate surrounding prose.
//!
//! # Modules
//!
//! - [`http`]: `HttpCodeGenClient` (OpenAI-compatible chat completions)
//! - [`extract`]: fence stripping, JSON payload extraction
//! - [`fakes`]: `ScriptedCodeGen` for tests

pub mod extract;
pub mod fakes;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::runtime::FaultKind;

pub use http::{HttpCodeGenClient, ServiceConfig};

/// Purpose of a prompt sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fault", rename_all = "snake_case")]
pub enum PromptKind {
    Assessment,
    Generation,
    Correction(FaultKind),
    Enhancement,
}

/// One free-text request to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: PromptKind,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(kind: PromptKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            prompt: prompt.into(),
        }
    }
}

/// Errors produced at the service boundary.
#[derive(Debug, thiserror::Error)]
pub enum CodeGenError {
    #[error("service request failed: {0}")]
    Http(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service response malformed: {0}")]
    Malformed(String),

    #[error("service returned an empty response")]
    Empty,

    #[error("api key not configured (env var {0})")]
    MissingApiKey(String),
}

impl From<reqwest::Error> for CodeGenError {
    fn from(err: reqwest::Error) -> Self {
        CodeGenError::Http(err.to_string())
    }
}

/// External code-generation service.
#[async_trait]
pub trait CodeGenService: Send + Sync {
    /// Send a prompt and return the raw text reply.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, CodeGenError>;
}
