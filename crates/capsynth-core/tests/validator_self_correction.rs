use std::path::Path;
use std::sync::Arc;

use capsynth_core::codegen::fakes::ScriptedCodeGen;
use capsynth_core::runtime::module_path;
use capsynth_core::validator::{ScanPolicy, ValidationState};
use capsynth_core::{
    CapabilityRuntime, FaultKind, PromptKind, RuntimeLimits, ValidationPolicy, ValidatorLoader,
};

const BROKEN: &str = "fn create( { #{ ";
const NO_FACTORY: &str = "fn greet(name) { `hello ${name}` }";
const WORKING: &str = r#"
fn create() { #{ greeted: 0 } }
fn greet(name) { this.greeted += 1; #{ success: true, message: `hello ${name}` } }
"#;

fn loader(svc: Arc<ScriptedCodeGen>, dir: &Path, policy: ValidationPolicy) -> ValidatorLoader {
    let runtime = CapabilityRuntime::new(dir.join("workspace"), &RuntimeLimits::default());
    ValidatorLoader::new(svc, runtime, dir.join("caps"), policy)
}

#[tokio::test]
async fn always_broken_candidate_stops_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Correction(FaultKind::Syntax), BROKEN);
    let loader = loader(svc.clone(), dir.path(), ValidationPolicy::default());

    let outcome = loader.load(BROKEN, "custom_tool_broken").await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.final_state(), ValidationState::Failure);
    assert_eq!(outcome.attempts.len(), 3);
    assert_eq!(svc.calls_of(PromptKind::Correction(FaultKind::Syntax)), 2);
    assert!(outcome
        .attempts
        .iter()
        .all(|a| a.error_kind == Some(FaultKind::Syntax) && a.reached == ValidationState::SyntaxCheck));
    assert_eq!(outcome.error.unwrap().kind, FaultKind::Syntax);
}

#[tokio::test]
async fn syntax_error_is_corrected_on_second_pass() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.push(
        PromptKind::Correction(FaultKind::Syntax),
        format!("Fixed it:\n```rhai\n{WORKING}\n```"),
    );
    let loader = loader(svc.clone(), dir.path(), ValidationPolicy::default());

    let outcome = loader.load(BROKEN, "custom_tool_fixed").await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.corrections(), 1);
    assert_eq!(outcome.final_source.trim(), WORKING.trim());
    assert_eq!(
        outcome.file_location,
        module_path(&dir.path().join("caps"), "custom_tool_fixed")
    );
    assert_eq!(
        std::fs::read_to_string(&outcome.file_location).unwrap().trim(),
        WORKING.trim()
    );

    let correction = &svc.requests()[0];
    assert_eq!(correction.kind, PromptKind::Correction(FaultKind::Syntax));
    assert!(correction.prompt.contains(BROKEN));

    let mut instance = outcome.instance.unwrap();
    let out = instance
        .call("greet", &[serde_json::json!("ada")])
        .unwrap();
    assert_eq!(out["message"], "hello ada");
}

#[tokio::test]
async fn missing_factory_gets_its_own_correction_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.push(PromptKind::Correction(FaultKind::MissingEntryPoint), WORKING);
    let loader = loader(svc.clone(), dir.path(), ValidationPolicy::default());

    let outcome = loader.load(NO_FACTORY, "custom_tool_factory").await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts[0].error_kind, Some(FaultKind::MissingEntryPoint));
    assert_eq!(outcome.attempts[0].reached, ValidationState::LocateEntryPoint);
    assert_eq!(
        svc.requests()[0].kind,
        PromptKind::Correction(FaultKind::MissingEntryPoint)
    );
}

#[tokio::test]
async fn failed_correction_request_retries_previous_source() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always_fail(PromptKind::Correction(FaultKind::Syntax), "service unavailable");
    let loader = loader(svc.clone(), dir.path(), ValidationPolicy::default());

    let outcome = loader.load(BROKEN, "custom_tool_offline").await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts.len(), 3);
    assert_eq!(outcome.corrections(), 0);
    assert_eq!(outcome.final_source, BROKEN);
}

#[tokio::test]
async fn single_attempt_policy_never_asks_for_corrections() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    let policy = ValidationPolicy {
        max_attempts: 1,
        ..ValidationPolicy::default()
    };
    let loader = loader(svc.clone(), dir.path(), policy);

    let outcome = loader.load(BROKEN, "custom_tool_once").await;
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(svc.call_count(), 0);
}

#[tokio::test]
async fn block_policy_turns_findings_into_policy_violations() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.push(PromptKind::Correction(FaultKind::PolicyViolation), WORKING);
    let policy = ValidationPolicy {
        scan_policy: ScanPolicy::Block,
        ..ValidationPolicy::default()
    };
    let loader = loader(svc.clone(), dir.path(), policy);

    let risky = r#"
fn create() { #{} }
fn peek() { read_text("../secrets.txt") }
"#;
    let outcome = loader.load(risky, "custom_tool_risky").await;

    assert!(outcome.is_success());
    let first = &outcome.attempts[0];
    assert_eq!(first.error_kind, Some(FaultKind::PolicyViolation));
    assert_eq!(first.reached, ValidationState::SecurityScan);
    assert!(!first.scan_findings.is_empty());
    assert!(outcome.attempts[1].scan_findings.is_empty());
}

#[tokio::test]
async fn warn_policy_records_findings_and_loads() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    let loader = loader(svc.clone(), dir.path(), ValidationPolicy::default());

    let risky = r#"
fn create() { #{} }
fn peek() { read_text("../secrets.txt") }
"#;
    let outcome = loader.load(risky, "custom_tool_warned").await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].scan_findings[0].pattern, "../");
    assert_eq!(svc.call_count(), 0);
}
