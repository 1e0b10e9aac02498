use std::path::Path;
use std::sync::Arc;

use capsynth_core::codegen::fakes::ScriptedCodeGen;
use capsynth_core::{
    CapabilityRegistry, CapsynthConfig, Category, Orchestrator, ProgressUpdate, PromptKind,
    StepType,
};

const QR_REQUEST: &str = "Generate a QR code for my website";

const GAP_VERDICT: &str = r#"{
  "can_handle": false,
  "confidence": 0.9,
  "missing_capability": "QR code generation",
  "required_functions": ["generate_qr"],
  "complexity_level": "simple",
  "estimated_lines_of_code": 30
}"#;

const HANDLED_VERDICT: &str = r#"{
  "can_handle": true,
  "confidence": 0.85,
  "missing_capability": null,
  "required_functions": []
}"#;

const BAD_QR: &str = r#"```rhai
fn create() { #{ generated: 0 } }
fn generate_qr(url, filename) { throw "encoder unavailable"; }
```"#;

const GOOD_QR: &str = r#"```rhai
fn create() { #{ generated: 0 } }
fn generate_qr(url, filename) {
    write_text(filename, url);
    this.generated += 1;
    #{ success: true, message: `QR code for ${url} saved to ${filename}`, filepath: filename }
}
```"#;

fn config(dir: &Path) -> CapsynthConfig {
    let mut config = CapsynthConfig::default();
    config.registry.capability_dir = dir.join("caps");
    config.runtime.workspace_dir = dir.join("workspace");
    config.synthesis.enhance_generated = false;
    config
}

fn setup(dir: &Path, svc: &Arc<ScriptedCodeGen>) -> (Orchestrator, CapabilityRegistry) {
    let config = config(dir);
    (Orchestrator::from_config(svc.clone(), &config), config.registry())
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<String> {
    let mut stages = Vec::new();
    while let Ok(update) = rx.try_recv() {
        stages.push(update.stage);
    }
    stages
}

#[tokio::test]
async fn allow_listed_request_needs_no_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);

    let result = orchestrator
        .run(&mut registry, "open Safari", &["open_app".to_string()], None)
        .await;

    assert!(result.success);
    assert_eq!(result.iterations_used, 0);
    assert!(result.trajectory.is_empty());
    assert!(result.final_result.unwrap().used_existing_capability);
    assert_eq!(svc.call_count(), 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_failure_feeds_the_next_generation() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, GAP_VERDICT);
    svc.push(PromptKind::Generation, BAD_QR);
    svc.push(PromptKind::Generation, GOOD_QR);
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);

    let result = orchestrator.run(&mut registry, QR_REQUEST, &[], None).await;

    assert!(result.success, "{}", result.trajectory_summary);
    assert_eq!(result.iterations_used, 2);

    let generations: Vec<_> = svc
        .requests()
        .into_iter()
        .filter(|r| r.kind == PromptKind::Generation)
        .collect();
    assert_eq!(generations.len(), 2);
    assert!(!generations[0].prompt.contains("Context from previous attempts"));
    assert!(generations[1].prompt.contains("failed during testing"));
    assert!(generations[1].prompt.contains("encoder unavailable"));

    // The cached verdict serves the second iteration.
    assert_eq!(svc.calls_of(PromptKind::Assessment), 1);

    let outcome = result.final_result.as_ref().unwrap();
    assert_eq!(outcome.category, Some(Category::Custom));
    assert!(outcome.test_result.as_ref().unwrap().overall_pass);
    assert!(result.code.contains("saved to"));

    // Only the working module stays registered.
    let module = outcome.module_name.as_deref().unwrap();
    assert_eq!(registry.module_names(), vec![module.to_string()]);
    let files = std::fs::read_dir(dir.path().join("caps")).unwrap().count();
    assert_eq!(files, 1);
    assert!(dir.path().join("workspace/test_qr.png").exists());
}

#[tokio::test]
async fn each_executed_phase_records_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, GAP_VERDICT);
    svc.push(PromptKind::Generation, BAD_QR);
    svc.push(PromptKind::Generation, GOOD_QR);
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);

    let result = orchestrator.run(&mut registry, QR_REQUEST, &[], None).await;

    let phases: Vec<(u32, StepType)> = result
        .trajectory
        .iter()
        .map(|s| (s.iteration, s.step_type))
        .collect();
    let mut expected = Vec::new();
    for iteration in 1..=2 {
        for phase in [
            StepType::Assessment,
            StepType::Synthesis,
            StepType::Validation,
            StepType::Testing,
        ] {
            expected.push((iteration, phase));
        }
    }
    assert_eq!(phases, expected);
    assert!(!result.trajectory[3].success);
    assert!(result.trajectory[7].success);
}

#[tokio::test]
async fn unusable_service_terminates_within_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::unparsable());
    let mut config = config(dir.path());
    config.orchestrator.max_iterations = 5;
    let mut orchestrator = Orchestrator::from_config(svc.clone(), &config);
    let mut registry = config.registry();

    let result = orchestrator.run(&mut registry, QR_REQUEST, &[], None).await;

    assert!(!result.success);
    assert!(result.iterations_used <= 5);
    assert!(result.last_error().is_some());
    assert!(registry.is_empty());
    assert_eq!(svc.calls_of(PromptKind::Generation), 0);
    // Fallback verdicts never count as a successful assessment.
    assert!(result
        .trajectory
        .iter()
        .filter(|s| s.step_type == StepType::Assessment)
        .all(|s| !s.success));
    // Validation never exceeds its own bound.
    for outcome in result.final_result.iter() {
        assert!(outcome.validation_attempts.len() <= 3);
    }
}

#[tokio::test]
async fn unavailable_assessment_never_triggers_generation() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always_fail(PromptKind::Assessment, "503 service unavailable");
    svc.always(PromptKind::Generation, GOOD_QR);
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let result = orchestrator
        .run(&mut registry, "summarize my unread email", &[], Some(&tx))
        .await;

    assert!(!result.success);
    assert_eq!(svc.calls_of(PromptKind::Generation), 0);
    // One failed assessment per iteration, then two in a row end the run.
    assert_eq!(result.iterations_used, 2);
    assert_eq!(result.trajectory.len(), 2);
    assert!(result
        .trajectory
        .iter()
        .all(|s| s.step_type == StepType::Assessment && !s.success));
    assert!(result.last_error().unwrap().contains("assessment unavailable"));
    assert!(registry.is_empty());

    let stages = drain(&mut rx);
    assert!(!stages.iter().any(|s| s == "synthesis"));
}

#[tokio::test]
async fn repeated_generation_failures_run_to_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, GAP_VERDICT);
    svc.always_fail(PromptKind::Generation, "model overloaded");
    let mut config = config(dir.path());
    config.orchestrator.max_iterations = 3;
    let mut orchestrator = Orchestrator::from_config(svc.clone(), &config);
    let mut registry = config.registry();

    let result = orchestrator.run(&mut registry, QR_REQUEST, &[], None).await;

    assert!(!result.success);
    assert_eq!(result.iterations_used, 3);
    assert_eq!(result.trajectory.len(), 6);
    assert_eq!(svc.calls_of(PromptKind::Generation), 3);
    assert!(result.last_error().unwrap().contains("model overloaded"));
}

#[tokio::test]
async fn confirmed_verdict_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, HANDLED_VERDICT);
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);

    let result = orchestrator.run(&mut registry, QR_REQUEST, &[], None).await;

    assert!(result.success);
    assert_eq!(result.iterations_used, 1);
    assert_eq!(result.trajectory.len(), 1);
    assert!(result.final_result.unwrap().used_existing_capability);
    assert_eq!(svc.calls_of(PromptKind::Generation), 0);
}

#[tokio::test]
async fn template_requests_build_without_generation() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, GAP_VERDICT);
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let result = orchestrator
        .run(
            &mut registry,
            "build an excel spreadsheet for my budget",
            &[],
            Some(&tx),
        )
        .await;

    assert!(result.success, "{}", result.trajectory_summary);
    assert_eq!(result.iterations_used, 1);
    assert_eq!(svc.call_count(), 1);

    let module = result.final_result.unwrap().module_name.unwrap();
    assert!(module.starts_with("spreadsheet_tool_"));
    assert!(registry.contains(&module));
    assert!(registry.get(&module).unwrap().file_location.exists());

    let stages = drain(&mut rx);
    assert_eq!(stages.first().map(String::as_str), Some("initialization"));
    for stage in ["iteration_1", "synthesis", "validation", "testing"] {
        assert!(stages.iter().any(|s| s == stage), "missing stage {stage}");
    }
    assert_eq!(stages.last().map(String::as_str), Some("success"));
}

#[tokio::test]
async fn disabled_recording_returns_no_steps() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, GAP_VERDICT);
    let mut config = config(dir.path());
    config.orchestrator.record_trajectory = false;
    let mut orchestrator = Orchestrator::from_config(svc.clone(), &config);
    let mut registry = config.registry();

    let result = orchestrator
        .run(&mut registry, "build an excel spreadsheet", &[], None)
        .await;

    assert!(result.success);
    assert!(result.trajectory.is_empty());
    assert!(result.trajectory_summary.contains("4 steps"));
}

#[tokio::test]
async fn final_failure_is_reported_to_the_sink() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(ScriptedCodeGen::new());
    svc.always(PromptKind::Assessment, "no idea");
    svc.always_fail(PromptKind::Generation, "model overloaded");
    let (mut orchestrator, mut registry) = setup(dir.path(), &svc);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    orchestrator
        .run(&mut registry, QR_REQUEST, &[], Some(&tx))
        .await;

    let stages = drain(&mut rx);
    assert_eq!(stages.last().map(String::as_str), Some("final_failure"));
}
