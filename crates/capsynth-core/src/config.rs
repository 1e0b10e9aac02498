//! Layered configuration: defaults, an optional TOML file, then environment
//! overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codegen::ServiceConfig;
use crate::domain::ConfigError;
use crate::harness::DEFAULT_PASS_THRESHOLD;
use crate::orchestrator::OrchestratorConfig;
use crate::registry::{CapabilityRegistry, DEFAULT_MAX_AGE_DAYS};
use crate::runtime::RuntimeLimits;
use crate::synth::SynthesisPolicy;
use crate::validator::ValidationPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub pass_threshold: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Where generated modules are persisted.
    pub capability_dir: PathBuf,
    pub cleanup_max_age_days: i64,
    /// Names of the built-in actions reported by `list`.
    pub built_in_actions: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capability_dir: PathBuf::from("generated_capabilities"),
            cleanup_max_age_days: DEFAULT_MAX_AGE_DAYS,
            built_in_actions: [
                "open_app",
                "search_web",
                "play_music",
                "set_timer",
                "send_message",
                "get_weather",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory generated modules may read and write through host functions.
    pub workspace_dir: PathBuf,
    pub limits: RuntimeLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("capsynth_workspace"),
            limits: RuntimeLimits::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsynthConfig {
    pub orchestrator: OrchestratorConfig,
    pub validation: ValidationPolicy,
    pub harness: HarnessConfig,
    pub registry: RegistryConfig,
    pub runtime: RuntimeConfig,
    pub synthesis: SynthesisPolicy,
    pub service: ServiceConfig,
}

impl CapsynthConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Defaults, overlaid by `path` when given, then by the environment.
    /// The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CAPSYNTH_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("CAPSYNTH_CAPABILITY_DIR") {
            self.registry.capability_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CAPSYNTH_WORKSPACE_DIR") {
            self.runtime.workspace_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CAPSYNTH_MAX_ITERATIONS") {
            self.orchestrator.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("CAPSYNTH_MAX_ITERATIONS is not a number: {raw}"))
            })?;
        }
        if let Some(model) = lookup("CAPSYNTH_MODEL") {
            self.service.model = model;
        }
        if let Some(url) = lookup("CAPSYNTH_BASE_URL") {
            self.service.base_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.max_iterations must be > 0".into(),
            ));
        }
        if self.validation.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "validation.max_attempts must be > 0".into(),
            ));
        }
        let threshold = self.harness.pass_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "harness.pass_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.registry.cleanup_max_age_days <= 0 {
            return Err(ConfigError::Invalid(
                "registry.cleanup_max_age_days must be > 0".into(),
            ));
        }
        if self.runtime.limits.max_operations == 0 {
            return Err(ConfigError::Invalid(
                "runtime.limits.max_operations must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Empty registry rooted at the configured capability directory.
    pub fn registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(
            &self.registry.capability_dir,
            self.registry.built_in_actions.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = CapsynthConfig::default();
        config.validate().unwrap();
        assert_eq!(config.orchestrator.max_iterations, 5);
        assert_eq!(config.validation.max_attempts, 3);
        assert_eq!(config.harness.pass_threshold, 0.8);
        assert_eq!(config.registry.cleanup_max_age_days, 30);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CapsynthConfig::from_toml_str(
            r#"
            [orchestrator]
            max_iterations = 2

            [validation]
            scan_policy = "block"
            "#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_iterations, 2);
        assert!(config.orchestrator.record_trajectory);
        assert_eq!(config.validation.max_attempts, 3);
        assert_eq!(config.validation.scan_policy, crate::validator::ScanPolicy::Block);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("CAPSYNTH_CAPABILITY_DIR", "/tmp/caps"),
            ("CAPSYNTH_MAX_ITERATIONS", "7"),
            ("CAPSYNTH_MODEL", "local-model"),
        ]
        .into_iter()
        .collect();

        let mut config = CapsynthConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.registry.capability_dir, PathBuf::from("/tmp/caps"));
        assert_eq!(config.orchestrator.max_iterations, 7);
        assert_eq!(config.service.model, "local-model");
    }

    #[test]
    fn bad_numeric_override_is_rejected() {
        let mut config = CapsynthConfig::default();
        let err = config
            .apply_overrides(|k| (k == "CAPSYNTH_MAX_ITERATIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_bounds_and_bad_thresholds_fail_validation() {
        let mut config = CapsynthConfig::default();
        config.orchestrator.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = CapsynthConfig::default();
        config.harness.pass_threshold = 0.0;
        assert!(config.validate().is_err());

        config.harness.pass_threshold = 1.5;
        assert!(config.validate().is_err());

        config.harness.pass_threshold = 1.0;
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CapsynthConfig::load(Some(Path::new("/nonexistent/capsynth.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
