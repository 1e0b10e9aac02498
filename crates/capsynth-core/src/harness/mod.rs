//! Adaptive test harness for live capability instances.
//!
//! One generic runner interprets [`TestCase`]s. Failures inside a case,
//! including panics, are recorded on that case and never propagate. A suite
//! passes when `passed / total >= pass_threshold`.

pub mod suite;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::metrics::METRICS;
use crate::obs;
use crate::runtime::CapabilityInstance;
use crate::synth::Category;

pub use suite::{build_suite, Expectations, TestCase, TestKind, TestSuite};

/// Default fraction of cases that must pass.
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.8;

/// Arity probe order for adaptive cases.
const ARITY_PROBE: [usize; 3] = [2, 1, 0];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub kind: TestKind,
    pub passed: bool,
    /// Operation that was resolved and called, if any.
    pub operation: Option<String>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub module_name: String,
    pub category: Category,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub overall_pass: bool,
    pub cases: Vec<CaseResult>,
    pub timestamp: DateTime<Utc>,
}

impl TestRunResult {
    /// `name: error` for each failed case.
    pub fn failure_details(&self) -> Vec<String> {
        self.cases
            .iter()
            .filter(|c| !c.passed)
            .map(|c| {
                format!(
                    "{}: {}",
                    c.name,
                    c.error.as_deref().unwrap_or("failed without error")
                )
            })
            .collect()
    }
}

/// Aggregate over every suite this harness has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessSummary {
    pub modules_tested: usize,
    pub modules_passed: usize,
    pub tests_run: usize,
    pub tests_passed: usize,
    pub overall_success_rate: f64,
    pub module_success_rate: f64,
}

/// `(success_rate, overall_pass)` for `passed` of `total` at `threshold`.
/// An empty suite never passes.
pub fn evaluate(total: usize, passed: usize, threshold: f64) -> (f64, bool) {
    if total == 0 {
        return (0.0, false);
    }
    let rate = passed as f64 / total as f64;
    (rate, rate >= threshold)
}

/// Outcome of one case before timing is attached.
struct CaseOutcome {
    passed: bool,
    operation: Option<String>,
    output: Option<Value>,
    error: Option<String>,
}

impl CaseOutcome {
    fn pass(output: Option<Value>) -> Self {
        Self {
            passed: true,
            operation: None,
            output,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            operation: None,
            output: None,
            error: Some(error.into()),
        }
    }

    fn on(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }
}

#[derive(Debug)]
pub struct TestHarness {
    pass_threshold: f64,
    history: Vec<TestRunResult>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new(DEFAULT_PASS_THRESHOLD)
    }
}

impl TestHarness {
    pub fn new(pass_threshold: f64) -> Self {
        Self {
            pass_threshold,
            history: Vec::new(),
        }
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    /// Run every case of `suite` against `instance`.
    pub fn run(&mut self, instance: &mut CapabilityInstance, suite: &TestSuite) -> TestRunResult {
        let mut cases = Vec::with_capacity(suite.cases.len());

        for case in &suite.cases {
            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| run_case(instance, case)))
                .unwrap_or_else(|_| CaseOutcome::fail("test case panicked"));
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            debug!(
                module = instance.module_name(),
                case = %case.name,
                passed = outcome.passed,
                duration_ms,
                "test case finished"
            );

            cases.push(CaseResult {
                name: case.name.clone(),
                kind: case.kind,
                passed: outcome.passed,
                operation: outcome.operation,
                output: outcome.output,
                error: outcome.error,
                duration_ms,
            });
        }

        let total = cases.len();
        let passed = cases.iter().filter(|c| c.passed).count();
        let (success_rate, overall_pass) = evaluate(total, passed, self.pass_threshold);

        info!(
            module = instance.module_name(),
            total,
            passed,
            success_rate,
            overall_pass,
            "test suite finished"
        );
        obs::emit_suite_evaluated(instance.module_name(), success_rate, overall_pass);
        METRICS.record_suite(overall_pass);

        let result = TestRunResult {
            module_name: instance.module_name().to_string(),
            category: suite.category,
            total,
            passed,
            failed: total - passed,
            success_rate,
            overall_pass,
            cases,
            timestamp: Utc::now(),
        };
        self.history.push(result.clone());
        result
    }

    pub fn history(&self) -> &[TestRunResult] {
        &self.history
    }

    pub fn summary(&self) -> HarnessSummary {
        let modules_tested = self.history.len();
        let modules_passed = self.history.iter().filter(|r| r.overall_pass).count();
        let tests_run: usize = self.history.iter().map(|r| r.total).sum();
        let tests_passed: usize = self.history.iter().map(|r| r.passed).sum();

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        HarnessSummary {
            modules_tested,
            modules_passed,
            tests_run,
            tests_passed,
            overall_success_rate: ratio(tests_passed, tests_run),
            module_success_rate: ratio(modules_passed, modules_tested),
        }
    }
}

/// First operation, pattern-major then lexical, whose name contains a pattern.
fn find_operation(instance: &CapabilityInstance, patterns: &[String]) -> Option<String> {
    let names = instance.operation_names();
    patterns.iter().find_map(|pattern| {
        let pattern = pattern.to_lowercase();
        names
            .iter()
            .find(|name| name.to_lowercase().contains(&pattern))
            .cloned()
    })
}

fn run_case(instance: &mut CapabilityInstance, case: &TestCase) -> CaseOutcome {
    match case.kind {
        TestKind::Import => CaseOutcome::pass(Some(Value::String("module loaded".into()))),
        TestKind::Instantiation => {
            CaseOutcome::pass(Some(Value::String("factory returned state".into())))
        }
        TestKind::MethodPresence => {
            let names = instance.operation_names();
            let found: Vec<String> = names
                .into_iter()
                .filter(|name| {
                    let lower = name.to_lowercase();
                    case.name_patterns
                        .iter()
                        .any(|p| lower.contains(&p.to_lowercase()))
                })
                .collect();
            if found.is_empty() {
                CaseOutcome::fail(format!(
                    "no operations match patterns {:?}",
                    case.name_patterns
                ))
            } else {
                CaseOutcome::pass(Some(Value::from(found)))
            }
        }
        TestKind::Functional => {
            let Some(operation) = case.operation.as_deref() else {
                return CaseOutcome::fail("functional case names no operation");
            };
            if !instance.has_operation(operation) {
                return CaseOutcome::fail(format!("operation {operation} not found"));
            }
            invoke_and_check(instance, operation, &case.args, &case.expectations).on(operation)
        }
        TestKind::AdaptiveFunctional => {
            let Some(operation) = find_operation(instance, &case.name_patterns) else {
                return CaseOutcome::fail(format!(
                    "no operations match patterns {:?}",
                    case.name_patterns
                ));
            };
            let declared = instance.arities(&operation).unwrap_or(&[]);
            let Some(arity) = ARITY_PROBE
                .iter()
                .copied()
                .find(|n| *n <= case.args.len() && declared.contains(n))
            else {
                return CaseOutcome::fail(format!(
                    "operation {operation} takes {declared:?} argument(s); none compatible with {} supplied",
                    case.args.len()
                ))
                .on(&operation);
            };
            invoke_and_check(instance, &operation, &case.args[..arity], &case.expectations)
                .on(&operation)
        }
    }
}

fn invoke_and_check(
    instance: &mut CapabilityInstance,
    operation: &str,
    args: &[Value],
    expectations: &Expectations,
) -> CaseOutcome {
    match instance.call(operation, args) {
        Ok(output) => match expectations.check(&output) {
            Ok(()) => CaseOutcome::pass(Some(output)),
            Err(reason) => CaseOutcome {
                passed: false,
                operation: None,
                output: Some(output),
                error: Some(reason),
            },
        },
        Err(e) => CaseOutcome::fail(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn threshold_boundary() {
        assert_eq!(evaluate(5, 4, DEFAULT_PASS_THRESHOLD), (0.8, true));
        assert!(!evaluate(5, 3, DEFAULT_PASS_THRESHOLD).1);
        assert!(!evaluate(0, 0, DEFAULT_PASS_THRESHOLD).1);
    }

    #[test]
    fn summary_of_empty_history() {
        let h = TestHarness::default();
        let s = h.summary();
        assert_eq!(s.modules_tested, 0);
        assert_eq!(s.overall_success_rate, 0.0);
    }

    #[test]
    fn failure_details_lists_failed_cases() {
        let result = TestRunResult {
            module_name: "m".into(),
            category: Category::Custom,
            total: 2,
            passed: 1,
            failed: 1,
            success_rate: 0.5,
            overall_pass: false,
            cases: vec![CaseResult {
                name: "qr_generation_adaptive".into(),
                kind: TestKind::AdaptiveFunctional,
                passed: false,
                operation: Some("generate_qr".into()),
                output: Some(json!(null)),
                error: Some("boom".into()),
                duration_ms: 0.1,
            }],
            timestamp: Utc::now(),
        };
        assert_eq!(result.failure_details(), vec!["qr_generation_adaptive: boom"]);
    }
}
