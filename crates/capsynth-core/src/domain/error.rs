//! Crate-level error taxonomy for capability synthesis.

use crate::codegen::CodeGenError;
use crate::registry::RegistryError;
use crate::runtime::LoadError;

/// Errors produced by configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Capability synthesis errors.
#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error("code generation failed: {0}")]
    CodeGen(#[from] CodeGenError),

    #[error("capability load failed: {0}")]
    Load(#[from] LoadError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for capability synthesis operations.
pub type Result<T> = std::result::Result<T, SynthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_mismatch_error() {
        let err = SynthError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_config_error_display() {
        let err = SynthError::Config(ConfigError::Invalid("max_iterations must be > 0".into()));
        assert!(err.to_string().contains("config error"));
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_registry_error_wraps() {
        let err: SynthError = RegistryError::ModuleNotFound("custom_tool_x".into()).into();
        assert!(err.to_string().contains("custom_tool_x"));
    }
}
