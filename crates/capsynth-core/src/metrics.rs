//! Process-wide synthesis counters.
//!
//! Counters are bumped at the call site and emitted together by
//! [`Metrics::flush`] as one `tracing::info!` event, typically at the end of
//! an orchestrator run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    syntheses: AtomicU64,
    corrections: AtomicU64,
    registrations: AtomicU64,
    suites_run: AtomicU64,
    suites_passed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            syntheses: AtomicU64::new(0),
            corrections: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            suites_run: AtomicU64::new(0),
            suites_passed: AtomicU64::new(0),
        }
    }

    /// A candidate was produced (template or generated).
    pub fn inc_syntheses(&self) {
        self.syntheses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "syntheses", "counter incremented");
    }

    /// A correction request returned replacement source.
    pub fn inc_corrections(&self) {
        self.corrections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "corrections", "counter incremented");
    }

    pub fn inc_registrations(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "registrations", "counter incremented");
    }

    /// A test suite ran; `passed` is its overall verdict.
    pub fn record_suite(&self, passed: bool) {
        self.suites_run.fetch_add(1, Ordering::Relaxed);
        if passed {
            self.suites_passed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "suites_run", passed, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            syntheses = self.syntheses(),
            corrections = self.corrections(),
            registrations = self.registrations(),
            suites_run = self.suites_run(),
            suites_passed = self.suites_passed(),
        );
    }

    pub fn syntheses(&self) -> u64 {
        self.syntheses.load(Ordering::Relaxed)
    }

    pub fn corrections(&self) -> u64 {
        self.corrections.load(Ordering::Relaxed)
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    pub fn suites_run(&self) -> u64 {
        self.suites_run.load(Ordering::Relaxed)
    }

    pub fn suites_passed(&self) -> u64 {
        self.suites_passed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.syntheses.store(0, Ordering::Relaxed);
        self.corrections.store(0, Ordering::Relaxed);
        self.registrations.store(0, Ordering::Relaxed);
        self.suites_run.store(0, Ordering::Relaxed);
        self.suites_passed.store(0, Ordering::Relaxed);
    }
}
