//! Structured events for the synthesis run lifecycle.
//!
//! `RunSpan` tags everything logged during one orchestrator run with its
//! `run_id`; the `emit_*` helpers give lifecycle events stable `event` names
//! so log pipelines can filter on them.

use tracing::{info, warn};

/// RAII guard for a run-scoped span.
///
/// Holds the span itself rather than an entered guard so it can live across
/// `.await` points; instrument futures with [`RunSpan::span`].
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("capsynth.run", run_id = %run_id),
        }
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

pub fn emit_run_started(run_id: &str, request: &str, max_iterations: u32) {
    info!(event = "run.started", run_id = %run_id, request = %request, max_iterations);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, iterations_used: u32, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms,
        iterations_used,
        success,
    );
}

/// A phase finished within an iteration.
pub fn emit_phase(run_id: &str, iteration: u32, phase: &str, success: bool) {
    info!(event = "run.phase", run_id = %run_id, iteration, phase = %phase, success);
}

/// A test suite verdict.
pub fn emit_suite_evaluated(module_name: &str, success_rate: f64, passed: bool) {
    info!(
        event = "suite.evaluated",
        module = %module_name,
        success_rate,
        passed,
    );
}

pub fn emit_module_registered(module_name: &str, operations: usize) {
    info!(event = "registry.registered", module = %module_name, operations);
}

/// Recovery skipped a persisted module (warning level).
pub fn emit_recovery_skipped(module_name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "registry.recovery_skipped", module = %module_name, error = %error);
}
