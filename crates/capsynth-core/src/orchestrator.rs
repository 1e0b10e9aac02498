//! Bounded, trajectory-informed synthesis loop.
//!
//! Each iteration runs assessment, synthesis, validation and testing,
//! appending exactly one [`TrajectoryStep`] per executed phase. The loop
//! stops on success, when the iteration cap is reached, or when the two most
//! recent steps both failed. Every phase fault is converted into a recorded
//! step; `run` itself never fails.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn, Instrument};

use crate::codegen::CodeGenService;
use crate::config::CapsynthConfig;
use crate::domain::{CapabilityRequest, GapAssessment, StepType, Trajectory, TrajectoryStep};
use crate::gap::{self, GapAssessor};
use crate::harness::{build_suite, TestHarness, TestRunResult};
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::registry::CapabilityRegistry;
use crate::runtime::CapabilityRuntime;
use crate::synth::{Category, CodeSynthesizer};
use crate::validator::{ValidationAttempt, ValidatorLoader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    /// When false, the returned trajectory is empty. The loop still keeps
    /// its own log for the continuation policy and prompt context.
    pub record_trajectory: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            record_trajectory: true,
        }
    }
}

/// What one iteration produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub success: bool,
    /// Existing actions were judged sufficient; nothing was synthesized.
    pub used_existing_capability: bool,
    pub assessment: Option<GapAssessment>,
    pub module_name: Option<String>,
    pub category: Option<Category>,
    pub validation_attempts: Vec<ValidationAttempt>,
    pub test_result: Option<TestRunResult>,
    pub code: String,
    pub error: Option<String>,
}

impl IterationOutcome {
    fn new(iteration: u32) -> Self {
        Self {
            iteration,
            success: false,
            used_existing_capability: false,
            assessment: None,
            module_name: None,
            category: None,
            validation_attempts: Vec::new(),
            test_result: None,
            code: String::new(),
            error: None,
        }
    }

    fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Single return value of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    pub run_id: String,
    pub success: bool,
    pub iterations_used: u32,
    pub trajectory: Vec<TrajectoryStep>,
    pub final_result: Option<IterationOutcome>,
    pub trajectory_summary: String,
    pub code: String,
}

impl IterationResult {
    /// Error of the final iteration, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.final_result.as_ref().and_then(|o| o.error.as_deref())
    }
}

fn step(
    iteration: u32,
    step_type: StepType,
    description: impl Into<String>,
    inputs: Value,
    outputs: Value,
    result: Result<(), String>,
) -> TrajectoryStep {
    TrajectoryStep {
        iteration,
        step_type,
        description: description.into(),
        timestamp: Utc::now(),
        inputs,
        outputs,
        success: result.is_ok(),
        error: result.err(),
    }
}

/// Per-run context threaded through one iteration.
struct RunContext<'a> {
    run_id: &'a str,
    max_iterations: u32,
    sink: Option<&'a dyn ProgressSink>,
    trajectory: Trajectory,
}

impl RunContext<'_> {
    fn report(&self, stage: impl Into<String>, message: impl Into<String>, iteration: Option<u32>) {
        if let Some(sink) = self.sink {
            let mut update = ProgressUpdate::new(stage, message);
            if let Some(i) = iteration {
                update = update.at(i, self.max_iterations);
            }
            sink.report(update);
        }
    }

    fn record(&mut self, step: TrajectoryStep) {
        obs::emit_phase(self.run_id, step.iteration, &step.step_type.to_string(), step.success);
        self.trajectory.record(step);
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    assessor: GapAssessor,
    synthesizer: CodeSynthesizer,
    validator: ValidatorLoader,
    harness: TestHarness,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        assessor: GapAssessor,
        synthesizer: CodeSynthesizer,
        validator: ValidatorLoader,
        harness: TestHarness,
    ) -> Self {
        Self {
            config,
            assessor,
            synthesizer,
            validator,
            harness,
        }
    }

    /// Wire every component from one configuration and service.
    pub fn from_config(service: Arc<dyn CodeGenService>, config: &CapsynthConfig) -> Self {
        let runtime = CapabilityRuntime::new(&config.runtime.workspace_dir, &config.runtime.limits);
        Self::new(
            config.orchestrator.clone(),
            GapAssessor::new(Arc::clone(&service)),
            CodeSynthesizer::new(Arc::clone(&service), config.synthesis.clone()),
            ValidatorLoader::new(
                service,
                runtime,
                &config.registry.capability_dir,
                config.validation.clone(),
            ),
            TestHarness::new(config.harness.pass_threshold),
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn runtime(&self) -> &CapabilityRuntime {
        self.validator.runtime()
    }

    pub fn harness(&self) -> &TestHarness {
        &self.harness
    }

    pub fn assessor(&self) -> &GapAssessor {
        &self.assessor
    }

    /// Drive assessment, synthesis, validation and testing for one request.
    pub async fn run(
        &mut self,
        registry: &mut CapabilityRegistry,
        request_text: &str,
        available_actions: &[String],
        sink: Option<&dyn ProgressSink>,
    ) -> IterationResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id);
        self.run_inner(&run_id, registry, request_text, available_actions, sink)
            .instrument(span.span().clone())
            .await
    }

    async fn run_inner(
        &mut self,
        run_id: &str,
        registry: &mut CapabilityRegistry,
        request_text: &str,
        available_actions: &[String],
        sink: Option<&dyn ProgressSink>,
    ) -> IterationResult {
        let started = Instant::now();
        let max_iterations = self.config.max_iterations;
        let request = CapabilityRequest::new(request_text, available_actions.iter().cloned());
        let mut ctx = RunContext {
            run_id,
            max_iterations,
            sink,
            trajectory: Trajectory::new(),
        };

        obs::emit_run_started(run_id, request_text, max_iterations);
        ctx.report(
            "initialization",
            "Analyzing the request and detecting missing capabilities",
            None,
        );

        let mut last: Option<IterationOutcome> = None;
        let mut iterations_used = 0;

        if gap::matches_allow_list(request_text) {
            let assessment = self
                .assessor
                .assess(&request, &registry.module_names(), None)
                .await;
            info!(confidence = assessment.confidence, "request served by existing actions");
            ctx.report("success", "Existing actions can handle this request", None);
            let mut outcome = IterationOutcome::new(0);
            outcome.success = true;
            outcome.used_existing_capability = true;
            outcome.assessment = Some(assessment);
            last = Some(outcome);
        } else {
            while iterations_used < max_iterations {
                iterations_used += 1;
                ctx.report(
                    format!("iteration_{iterations_used}"),
                    format!("Generating tool (attempt {iterations_used}/{max_iterations})"),
                    Some(iterations_used),
                );

                let outcome = self
                    .iterate(iterations_used, registry, &request, &mut ctx)
                    .await;
                let success = outcome.success;
                last = Some(outcome);

                if success {
                    break;
                }
                if ctx.trajectory.last_two_failed() {
                    info!(iteration = iterations_used, "stopping: two consecutive failed steps");
                    break;
                }
            }
        }

        let success = last.as_ref().map(|o| o.success).unwrap_or(false);
        if !success {
            ctx.report(
                "final_failure",
                format!("Failed to produce a working tool after {iterations_used} attempt(s)"),
                None,
            );
        }

        obs::emit_run_finished(
            run_id,
            started.elapsed().as_millis() as u64,
            iterations_used,
            success,
        );
        METRICS.flush();

        let trajectory_summary = ctx.trajectory.summary();
        let trajectory = if self.config.record_trajectory {
            ctx.trajectory.into_steps()
        } else {
            Vec::new()
        };
        let code = last.as_ref().map(|o| o.code.clone()).unwrap_or_default();

        IterationResult {
            run_id: run_id.to_string(),
            success,
            iterations_used,
            trajectory,
            final_result: last,
            trajectory_summary,
            code,
        }
    }

    async fn iterate(
        &mut self,
        iteration: u32,
        registry: &mut CapabilityRegistry,
        request: &CapabilityRequest,
        ctx: &mut RunContext<'_>,
    ) -> IterationOutcome {
        let mut outcome = IterationOutcome::new(iteration);
        let digest = (!ctx.trajectory.is_empty()).then(|| ctx.trajectory.digest());
        let digest = digest.as_deref();

        // Assessment
        let assessment = self
            .assessor
            .assess(request, &registry.module_names(), digest)
            .await;
        let assess_result = match assessment.fallback_reason() {
            Some(reason) => Err(format!("assessment unavailable: {reason}")),
            None => Ok(()),
        };
        ctx.record(step(
            iteration,
            StepType::Assessment,
            format!("Capability assessment (iteration {iteration})"),
            json!({
                "request": request.text,
                "actions": request.available_actions,
                "trajectory_context": digest,
            }),
            serde_json::to_value(&assessment).unwrap_or(Value::Null),
            assess_result.clone(),
        ));
        outcome.assessment = Some(assessment.clone());

        // No verdict means no evidence of a gap; synthesis waits for one.
        if let Err(error) = assess_result {
            ctx.report("assessment", error.clone(), Some(iteration));
            return outcome.failed(error);
        }

        if assessment.can_handle {
            ctx.report("success", "Existing capabilities can handle this request", Some(iteration));
            outcome.success = true;
            outcome.used_existing_capability = true;
            return outcome;
        }

        // Synthesis
        ctx.report(
            "synthesis",
            format!(
                "Generating code for: {}",
                assessment.missing().unwrap_or(&request.text)
            ),
            Some(iteration),
        );
        let candidate = match self
            .synthesizer
            .generate(&request.text, &assessment, digest)
            .await
        {
            Ok(candidate) => candidate,
            Err(e) => {
                let error = format!("synthesis failed: {e}");
                ctx.record(step(
                    iteration,
                    StepType::Synthesis,
                    "Code synthesis",
                    json!({ "request": request.text }),
                    Value::Null,
                    Err(error.clone()),
                ));
                return outcome.failed(error);
            }
        };
        METRICS.inc_syntheses();
        ctx.record(step(
            iteration,
            StepType::Synthesis,
            format!("Synthesized {}", candidate.module_name),
            json!({ "request": request.text }),
            json!({
                "module_name": candidate.module_name,
                "category": candidate.category,
                "from_template": candidate.from_template,
                "enhanced": candidate.enhanced,
                "source_len": candidate.source.len(),
            }),
            Ok(()),
        ));
        outcome.module_name = Some(candidate.module_name.clone());
        outcome.category = Some(candidate.category);
        outcome.code = candidate.source.clone();

        // Validation
        ctx.report(
            "validation",
            format!("Validating {}", candidate.module_name),
            Some(iteration),
        );
        let validation = self
            .validator
            .load(&candidate.source, &candidate.module_name)
            .await;
        outcome.code = validation.final_source.clone();
        outcome.validation_attempts = validation.attempts.clone();
        let validation_inputs = json!({ "module_name": candidate.module_name });
        let validation_outputs = json!({
            "attempts": validation.attempts.len(),
            "corrections": validation.corrections(),
            "file_location": validation.file_location,
        });

        let registered = match validation.instance {
            Some(instance) => registry
                .register(instance, validation.file_location.clone(), &validation.final_source)
                .map_err(|e| format!("registration failed: {e}")),
            None => {
                // A candidate that never loaded must not be picked up by recovery.
                if let Err(e) = std::fs::remove_file(&validation.file_location) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(module = %candidate.module_name, error = %e, "failed to remove rejected module");
                    }
                }
                Err(validation
                    .error
                    .as_ref()
                    .map(|e| format!("validation failed after {} attempt(s): {e}", validation.attempts.len()))
                    .unwrap_or_else(|| "validation failed".to_string()))
            }
        };
        ctx.record(step(
            iteration,
            StepType::Validation,
            format!("Validated and loaded {}", candidate.module_name),
            validation_inputs,
            validation_outputs,
            registered.clone(),
        ));
        if let Err(error) = registered {
            return outcome.failed(error);
        }

        // Testing
        ctx.report(
            "testing",
            "Tool generated, testing functionality",
            Some(iteration),
        );
        let suite = build_suite(candidate.category, &request.text);
        let Some(instance) = registry.instance_mut(&candidate.module_name) else {
            let error = format!("registered module {} vanished", candidate.module_name);
            ctx.record(step(
                iteration,
                StepType::Testing,
                "Capability testing",
                Value::Null,
                Value::Null,
                Err(error.clone()),
            ));
            return outcome.failed(error);
        };
        let result = self.harness.run(instance, &suite);

        let test_result = if result.overall_pass {
            Ok(())
        } else {
            Err(format!(
                "{} of {} tests passed ({:.0}%): {}",
                result.passed,
                result.total,
                result.success_rate * 100.0,
                result.failure_details().join("; ")
            ))
        };
        ctx.record(step(
            iteration,
            StepType::Testing,
            format!("Ran {} tests against {}", result.total, candidate.module_name),
            json!({ "suite": suite.cases.iter().map(|c| c.name.as_str()).collect::<Vec<_>>() }),
            json!({
                "passed": result.passed,
                "total": result.total,
                "success_rate": result.success_rate,
            }),
            test_result.clone(),
        ));
        outcome.test_result = Some(result);

        match test_result {
            Ok(()) => {
                ctx.report("success", "Tool is ready and working", Some(iteration));
                outcome.success = true;
                outcome
            }
            Err(error) => {
                // Failed modules do not stay in the registry.
                if let Err(e) = registry.unregister(&candidate.module_name) {
                    warn!(module = %candidate.module_name, error = %e, "failed to unregister module");
                }
                ctx.report(
                    "test_failed",
                    format!("Tool test failed: {}", truncate(&error, 100)),
                    Some(iteration),
                );
                outcome.failed(error)
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
