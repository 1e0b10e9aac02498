//! Declarative test cases and per-category suites.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::synth::Category;

/// How a case finds and exercises its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// Module parsed and loaded.
    Import,
    /// Factory produced a state.
    Instantiation,
    /// Some operation name contains one of the patterns.
    MethodPresence,
    /// Call a known operation with fixed arguments.
    Functional,
    /// Search operations by name pattern, then call with an arity probe.
    AdaptiveFunctional,
}

/// Conditions on an operation's result. Every declared condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expectations {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_success: Option<bool>,
}

impl Expectations {
    pub fn is_empty(&self) -> bool {
        self.expected_keys.is_empty()
            && self.expected_value.is_none()
            && self.expected_success.is_none()
    }

    /// Check `result`, describing the first unmet condition.
    pub fn check(&self, result: &Value) -> Result<(), String> {
        if !self.expected_keys.is_empty() {
            let Some(map) = result.as_object() else {
                return Err("result is not a map".to_string());
            };
            let missing: Vec<&str> = self
                .expected_keys
                .iter()
                .filter(|k| !map.contains_key(k.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(format!("result is missing keys {missing:?}"));
            }
        }

        if let Some(expected) = &self.expected_value {
            if result != expected {
                return Err(format!("expected {expected}, got {result}"));
            }
        }

        if let Some(expected) = self.expected_success {
            match result.get("success").and_then(Value::as_bool) {
                Some(actual) if actual == expected => {}
                Some(actual) => return Err(format!("expected success={expected}, got {actual}")),
                None => return Err("result has no boolean success flag".to_string()),
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    pub kind: TestKind,
    /// Target of a `Functional` case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Substrings searched by `MethodPresence` and `AdaptiveFunctional` cases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default)]
    pub expectations: Expectations,
}

impl TestCase {
    fn base(name: &str, description: &str, kind: TestKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            operation: None,
            name_patterns: Vec::new(),
            args: Vec::new(),
            expectations: Expectations::default(),
        }
    }

    pub fn import() -> Self {
        Self::base("import_test", "Module loads", TestKind::Import)
    }

    pub fn instantiation() -> Self {
        Self::base(
            "instantiation_test",
            "Factory returns a state",
            TestKind::Instantiation,
        )
    }

    pub fn presence(name: &str, description: &str, patterns: &[&str]) -> Self {
        let mut case = Self::base(name, description, TestKind::MethodPresence);
        case.name_patterns = patterns.iter().map(|p| p.to_string()).collect();
        case
    }

    pub fn functional(name: &str, description: &str, operation: &str, args: Vec<Value>) -> Self {
        let mut case = Self::base(name, description, TestKind::Functional);
        case.operation = Some(operation.to_string());
        case.args = args;
        case
    }

    pub fn adaptive(name: &str, description: &str, patterns: &[&str], args: Vec<Value>) -> Self {
        let mut case = Self::base(name, description, TestKind::AdaptiveFunctional);
        case.name_patterns = patterns.iter().map(|p| p.to_string()).collect();
        case.args = args;
        case
    }

    pub fn expect_keys(mut self, keys: &[&str]) -> Self {
        self.expectations.expected_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn expect_value(mut self, value: Value) -> Self {
        self.expectations.expected_value = Some(value);
        self
    }

    pub fn expect_success(mut self, success: bool) -> Self {
        self.expectations.expected_success = Some(success);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub category: Category,
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

pub const QR_PATTERNS: &[&str] = &[
    "generate_qr",
    "qr_code",
    "create_qr",
    "generate_and_save",
    "qr",
    "generate",
];

pub const GENERIC_VERB_PATTERNS: &[&str] = &[
    "generate",
    "create",
    "process",
    "convert",
    "calculate",
    "compute",
    "build",
    "make",
    "execute",
    "run",
    "save",
];

/// Suite for a candidate of `category` built for `request`.
///
/// Always starts with the import and instantiation baselines.
pub fn build_suite(category: Category, request: &str) -> TestSuite {
    let mut cases = vec![TestCase::import(), TestCase::instantiation()];

    match category {
        Category::Spreadsheet => {
            cases.push(
                TestCase::adaptive(
                    "spreadsheet_creation_test",
                    "Spreadsheet creation",
                    &["create", "spreadsheet", "financial", "model"],
                    vec![json!([{"name": "Test", "value": 123}]), json!("test_spreadsheet")],
                )
                .expect_keys(&["success"]),
            );
            cases.push(
                TestCase::adaptive(
                    "data_manipulation_test",
                    "Rows can be added",
                    &["add", "data", "current"],
                    vec![json!([{"name": "Test2", "value": 456}])],
                )
                .expect_keys(&["success"]),
            );
            cases.push(TestCase::presence(
                "method_detection_test",
                "Spreadsheet operations exist",
                &["create", "add", "save", "load"],
            ));
        }
        Category::FileManager => {
            cases.push(
                TestCase::functional(
                    "safe_path_test",
                    "Workspace-relative paths are accepted",
                    "is_safe_path",
                    vec![json!("notes/test")],
                )
                .expect_value(json!(true)),
            );
            cases.push(
                TestCase::functional(
                    "list_files_test",
                    "Directory listing",
                    "list_files",
                    vec![json!(".")],
                )
                .expect_keys(&["success", "files", "count"]),
            );
        }
        Category::DataProcessor => {
            cases.push(
                TestCase::functional(
                    "analyze_data_test",
                    "Analysis without loaded data reports failure",
                    "analyze_data",
                    Vec::new(),
                )
                .expect_keys(&["success"])
                .expect_success(false),
            );
        }
        Category::Custom => {
            if request.to_lowercase().contains("qr") {
                cases.push(TestCase::presence(
                    "qr_method_detection",
                    "A QR generation operation exists",
                    QR_PATTERNS,
                ));
                cases.push(
                    TestCase::adaptive(
                        "qr_generation_adaptive",
                        "QR generation with url and filename",
                        QR_PATTERNS,
                        vec![json!("https://example.com"), json!("test_qr.png")],
                    )
                    .expect_keys(&["success", "message"]),
                );
            } else {
                cases.push(TestCase::presence(
                    "primary_operation_detection",
                    "A primary operation exists",
                    GENERIC_VERB_PATTERNS,
                ));
                cases.push(
                    TestCase::adaptive(
                        "primary_operation_adaptive",
                        "Primary operation handles the request text",
                        GENERIC_VERB_PATTERNS,
                        vec![json!(request)],
                    )
                    .expect_keys(&["success", "message"]),
                );
            }
        }
    }

    TestSuite { category, cases }
}
