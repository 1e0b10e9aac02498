//! Validation and self-correction of synthesized candidates.
//!
//! Each pass walks the state machine
//!
//! ```text
//! SyntaxCheck -> SecurityScan -> Persist -> Load -> LocateEntryPoint -> Instantiate -> Success
//! ```
//!
//! and stops at the first failing state. A failed pass is classified, a full
//! corrected module is requested with a prompt specific to the fault kind,
//! and the machine restarts with the new source. `max_attempts` bounds the
//! number of passes, so at most `max_attempts - 1` corrections are requested.

pub mod scan;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::codegen::extract::strip_code_fences;
use crate::codegen::{CodeGenService, GenerationRequest, PromptKind};
use crate::metrics::METRICS;
use crate::prompts;
use crate::runtime::{module_path, CapabilityInstance, CapabilityRuntime, FaultKind, LoadError};

pub use scan::{default_disallowed_patterns, scan, ScanFinding, ScanPolicy};

/// State of one validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    SyntaxCheck,
    SecurityScan,
    Persist,
    Load,
    LocateEntryPoint,
    Instantiate,
    Success,
    Failure,
}

/// Validation bounds and scan behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub max_attempts: u32,
    pub scan_policy: ScanPolicy,
    pub disallowed_patterns: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            scan_policy: ScanPolicy::Warn,
            disallowed_patterns: default_disallowed_patterns(),
        }
    }
}

/// Record of one pass through the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    /// 1-based pass number.
    pub attempt_index: u32,
    /// Last state entered; `Success` or the state that failed.
    pub reached: ValidationState,
    pub error_kind: Option<FaultKind>,
    pub error: Option<String>,
    /// Replacement source requested after this pass, if any was obtained.
    pub corrected_source: Option<String>,
    pub scan_findings: Vec<ScanFinding>,
}

/// Result of validating one candidate.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub module_name: String,
    pub attempts: Vec<ValidationAttempt>,
    pub final_source: String,
    pub file_location: PathBuf,
    pub instance: Option<CapabilityInstance>,
    pub error: Option<LoadError>,
}

impl ValidationOutcome {
    pub fn is_success(&self) -> bool {
        self.instance.is_some()
    }

    /// Number of correction requests that produced a replacement.
    pub fn corrections(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.corrected_source.is_some())
            .count()
    }

    pub fn final_state(&self) -> ValidationState {
        if self.is_success() {
            ValidationState::Success
        } else {
            ValidationState::Failure
        }
    }
}

/// Tracks the current state of a pass and logs transitions.
struct Pass<'a> {
    module_name: &'a str,
    state: ValidationState,
}

impl Pass<'_> {
    fn enter(&mut self, next: ValidationState) {
        debug!(module = self.module_name, from = ?self.state, to = ?next, "validation transition");
        self.state = next;
    }
}

pub struct ValidatorLoader {
    service: Arc<dyn CodeGenService>,
    runtime: CapabilityRuntime,
    dir: PathBuf,
    policy: ValidationPolicy,
}

impl ValidatorLoader {
    pub fn new(
        service: Arc<dyn CodeGenService>,
        runtime: CapabilityRuntime,
        dir: impl Into<PathBuf>,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            service,
            runtime,
            dir: dir.into(),
            policy,
        }
    }

    pub fn runtime(&self) -> &CapabilityRuntime {
        &self.runtime
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate `source` as `module_name`, self-correcting within the bound.
    pub async fn load(&self, source: &str, module_name: &str) -> ValidationOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let file_location = module_path(&self.dir, module_name);
        let mut current = source.to_string();
        let mut attempts = Vec::new();

        for attempt_index in 1..=max_attempts {
            let mut pass = Pass {
                module_name,
                state: ValidationState::SyntaxCheck,
            };
            let mut findings = Vec::new();

            match self.run_pass(&current, module_name, &mut pass, &mut findings) {
                Ok(instance) => {
                    info!(module = module_name, attempt = attempt_index, "candidate validated");
                    attempts.push(ValidationAttempt {
                        attempt_index,
                        reached: ValidationState::Success,
                        error_kind: None,
                        error: None,
                        corrected_source: None,
                        scan_findings: findings,
                    });
                    return ValidationOutcome {
                        module_name: module_name.to_string(),
                        attempts,
                        final_source: current,
                        file_location,
                        instance: Some(instance),
                        error: None,
                    };
                }
                Err(err) => {
                    warn!(
                        module = module_name,
                        attempt = attempt_index,
                        max_attempts,
                        state = ?pass.state,
                        kind = %err.kind,
                        error = %err.message,
                        "validation pass failed"
                    );

                    let corrected = if attempt_index < max_attempts {
                        self.request_correction(&current, &err).await
                    } else {
                        None
                    };

                    attempts.push(ValidationAttempt {
                        attempt_index,
                        reached: pass.state,
                        error_kind: Some(err.kind),
                        error: Some(err.message.clone()),
                        corrected_source: corrected.clone(),
                        scan_findings: findings,
                    });

                    if attempt_index == max_attempts {
                        return ValidationOutcome {
                            module_name: module_name.to_string(),
                            attempts,
                            final_source: current,
                            file_location,
                            instance: None,
                            error: Some(err),
                        };
                    }
                    if let Some(next) = corrected {
                        current = next;
                    }
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        ValidationOutcome {
            module_name: module_name.to_string(),
            attempts,
            final_source: current,
            file_location,
            instance: None,
            error: Some(LoadError::new(FaultKind::Runtime, "no validation attempts were made")),
        }
    }

    fn run_pass(
        &self,
        source: &str,
        module_name: &str,
        pass: &mut Pass<'_>,
        findings: &mut Vec<ScanFinding>,
    ) -> Result<CapabilityInstance, LoadError> {
        self.runtime.check_syntax(source)?;

        pass.enter(ValidationState::SecurityScan);
        *findings = scan(source, &self.policy.disallowed_patterns);
        for finding in findings.iter() {
            warn!(
                module = module_name,
                pattern = %finding.pattern,
                line = finding.line,
                "disallowed pattern in candidate"
            );
        }
        if self.policy.scan_policy == ScanPolicy::Block && !findings.is_empty() {
            let patterns: Vec<&str> = findings.iter().map(|f| f.pattern.as_str()).collect();
            return Err(LoadError::new(
                FaultKind::PolicyViolation,
                format!("disallowed patterns: {}", patterns.join(", ")),
            ));
        }

        pass.enter(ValidationState::Persist);
        let path = persist_module(&self.dir, module_name, source).map_err(|e| {
            LoadError::new(FaultKind::Runtime, format!("cannot persist module: {e}"))
        })?;

        pass.enter(ValidationState::Load);
        let namespace = self.runtime.load_namespace(module_name, &path)?;

        pass.enter(ValidationState::LocateEntryPoint);
        self.runtime.locate_entry_point(&namespace)?;

        pass.enter(ValidationState::Instantiate);
        let instance = self.runtime.instantiate(namespace)?;

        pass.enter(ValidationState::Success);
        Ok(instance)
    }

    /// Ask for a full replacement. `None` keeps the current source.
    async fn request_correction(&self, source: &str, err: &LoadError) -> Option<String> {
        let prompt = prompts::correction(err.kind, source, &err.message);
        let request = GenerationRequest::new(PromptKind::Correction(err.kind), prompt);
        match self.service.complete(&request).await {
            Ok(reply) => {
                let corrected = strip_code_fences(&reply);
                if corrected.is_empty() {
                    warn!(kind = %err.kind, "correction returned no source, retrying previous");
                    return None;
                }
                METRICS.inc_corrections();
                info!(kind = %err.kind, "received corrected module");
                Some(corrected)
            }
            Err(e) => {
                warn!(kind = %err.kind, error = %e, "correction request failed, retrying previous");
                None
            }
        }
    }
}

/// Atomically write `<dir>/<module_name>.rhai`, replacing any earlier version.
pub fn persist_module(dir: &Path, module_name: &str, source: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = module_path(dir, module_name);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(source.as_bytes())?;
    tmp.persist(&path).map_err(|e| e.error)?;
    Ok(path)
}
