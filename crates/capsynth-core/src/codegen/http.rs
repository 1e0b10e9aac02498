//! HTTP client for an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CodeGenError, CodeGenService, GenerationRequest};

const SYSTEM_PROMPT: &str = "You write small, self-contained Rhai modules and \
precise JSON verdicts for an automation assistant. Follow the requested output \
format exactly.";

/// Code-generation service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL, without the trailing `/chat/completions`.
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request timeout. `None` leaves generation calls unbounded.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "CAPSYNTH_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions client for the code-generation service.
pub struct HttpCodeGenClient {
    config: ServiceConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl HttpCodeGenClient {
    /// Create a client, reading the API key from `config.api_key_env`.
    pub fn new(config: ServiceConfig) -> Result<Self, CodeGenError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| CodeGenError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: ServiceConfig, api_key: impl Into<String>) -> Result<Self, CodeGenError> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "capsynth/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build()?;

        Ok(HttpCodeGenClient {
            config,
            api_key: api_key.into(),
            http_client,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CodeGenService for HttpCodeGenClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, CodeGenError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(kind = ?request.kind, prompt_len = request.prompt.len(), "sending prompt");

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "code generation service rejected request");
            return Err(CodeGenError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CodeGenError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CodeGenError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ServiceConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        };
        let client = HttpCodeGenClient::with_api_key(config, "k").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn default_config_has_no_timeout() {
        let config = ServiceConfig::default();
        assert!(config.request_timeout_secs.is_none());
        assert_eq!(config.api_key_env, "CAPSYNTH_API_KEY");
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = ServiceConfig {
            api_key_env: "CAPSYNTH_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        match HttpCodeGenClient::new(config) {
            Err(CodeGenError::MissingApiKey(var)) => {
                assert_eq!(var, "CAPSYNTH_TEST_KEY_THAT_IS_NEVER_SET")
            }
            other => panic!("expected MissingApiKey, got {:?}", other.map(|_| ())),
        }
    }
}
