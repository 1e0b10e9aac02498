use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use serde_json::json;

use capsynth_core::runtime::module_path;
use capsynth_core::{CapabilityRegistry, CapabilityRuntime, RegistryError, RuntimeLimits};

const COUNTER: &str = r#"
fn create() { #{ count: 0 } }
fn increment(by) { this.count += by; #{ success: true, count: this.count } }
fn reset() { this.count = 0; #{ success: true, count: 0 } }
"#;

fn runtime(dir: &Path) -> CapabilityRuntime {
    CapabilityRuntime::new(dir.join("workspace"), &RuntimeLimits::default())
}

fn persist(caps: &Path, name: &str, source: &str) -> PathBuf {
    std::fs::create_dir_all(caps).unwrap();
    let path = module_path(caps, name);
    std::fs::write(&path, source).unwrap();
    path
}

fn registry_with_counter(dir: &Path) -> (CapabilityRegistry, PathBuf) {
    let caps = dir.join("caps");
    let path = persist(&caps, "custom_tool_counter", COUNTER);
    let instance = runtime(dir)
        .load_instance("custom_tool_counter", &path)
        .unwrap();
    let mut registry = CapabilityRegistry::new(&caps, vec!["open_app".into()]);
    registry.register(instance, path.clone(), COUNTER).unwrap();
    (registry, path)
}

#[test]
fn invocation_keeps_state_between_calls() {
    let dir = tempfile::tempdir().unwrap();
    let (mut registry, _) = registry_with_counter(dir.path());

    registry
        .use_capability("custom_tool_counter", "increment", &[json!(2)])
        .unwrap();
    let out = registry
        .use_capability("custom_tool_counter", "increment", &[json!(3)])
        .unwrap();
    assert_eq!(out["count"], 5);
}

#[test]
fn unknown_module_and_operation_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (mut registry, _) = registry_with_counter(dir.path());

    let err = registry
        .use_capability("custom_tool_missing", "increment", &[json!(1)])
        .unwrap_err();
    assert!(matches!(err, RegistryError::ModuleNotFound(_)));

    let err = registry
        .use_capability("custom_tool_counter", "decrement", &[])
        .unwrap_err();
    assert!(matches!(err, RegistryError::OperationNotFound { .. }));

    let err = registry
        .use_capability("custom_tool_counter", "increment", &[])
        .unwrap_err();
    assert!(matches!(err, RegistryError::Invocation { .. }));
}

#[test]
fn listing_reports_built_ins_and_operations() {
    let dir = tempfile::tempdir().unwrap();
    let (registry, path) = registry_with_counter(dir.path());

    let listing = registry.list_capabilities();
    assert_eq!(listing.built_in, vec!["open_app".to_string()]);
    let module = &listing.generated["custom_tool_counter"];
    assert_eq!(module.operations, vec!["increment".to_string(), "reset".to_string()]);
    assert_eq!(module.file_location, path);
    assert_eq!(module.source_digest.len(), 64);
}

#[test]
fn recovery_reloads_persisted_modules_and_skips_broken_ones() {
    let dir = tempfile::tempdir().unwrap();
    let caps = dir.path().join("caps");
    persist(&caps, "custom_tool_counter", COUNTER);
    persist(&caps, "custom_tool_broken", "fn create( {");
    persist(&caps, "custom_tool_no_factory", "fn run() { 1 }");
    std::fs::write(caps.join("notes.txt"), "not a module").unwrap();

    let mut registry = CapabilityRegistry::new(&caps, Vec::new());
    let recovered = registry.recover(&runtime(dir.path())).unwrap();

    assert_eq!(recovered, vec!["custom_tool_counter".to_string()]);
    assert_eq!(registry.len(), 1);
    let out = registry
        .use_capability("custom_tool_counter", "increment", &[json!(1)])
        .unwrap();
    assert_eq!(out["count"], 1);

    // A second pass finds nothing new.
    assert!(registry.recover(&runtime(dir.path())).unwrap().is_empty());
}

#[test]
fn recovery_of_missing_directory_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = CapabilityRegistry::new(dir.path().join("nowhere"), Vec::new());
    assert!(registry.recover(&runtime(dir.path())).unwrap().is_empty());
}

#[test]
fn cleanup_removes_only_expired_modules() {
    let dir = tempfile::tempdir().unwrap();
    let (mut registry, fresh_path) = registry_with_counter(dir.path());

    let caps = dir.path().join("caps");
    let old_path = persist(&caps, "custom_tool_old", COUNTER);
    let old = runtime(dir.path())
        .load_instance("custom_tool_old", &old_path)
        .unwrap();
    registry
        .register_at(old, old_path.clone(), COUNTER, Utc::now() - Duration::days(45))
        .unwrap();

    let removed = registry.cleanup(Duration::days(30));

    assert_eq!(removed, vec!["custom_tool_old".to_string()]);
    assert!(!old_path.exists());
    assert!(fresh_path.exists());
    assert!(registry.contains("custom_tool_counter"));
    assert!(!registry.contains("custom_tool_old"));
}
