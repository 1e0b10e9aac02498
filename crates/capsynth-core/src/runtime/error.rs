//! Error types for the capability runtime.

use rhai::EvalAltResult;
use serde::{Deserialize, Serialize};

/// Classification of a candidate failure, used to pick a correction prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Syntax,
    Import,
    MissingEntryPoint,
    Runtime,
    PolicyViolation,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Syntax => "syntax",
            Self::Import => "import",
            Self::MissingEntryPoint => "missing_entry_point",
            Self::Runtime => "runtime",
            Self::PolicyViolation => "policy_violation",
        };
        f.write_str(s)
    }
}

/// A classified failure while checking, loading or instantiating a module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct LoadError {
    pub kind: FaultKind,
    pub message: String,
}

impl LoadError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify an interpreter error.
    pub fn from_eval(err: &EvalAltResult) -> Self {
        Self::new(classify(err), err.to_string())
    }
}

fn classify(err: &EvalAltResult) -> FaultKind {
    match err {
        EvalAltResult::ErrorParsing(..) => FaultKind::Syntax,
        EvalAltResult::ErrorModuleNotFound(..) | EvalAltResult::ErrorFunctionNotFound(..) => {
            FaultKind::Import
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => classify(inner),
        _ => FaultKind::Runtime,
    }
}

/// Failure invoking an operation on a live instance.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("operation {operation} takes {expected:?} argument(s), got {given}")]
    Arity {
        operation: String,
        given: usize,
        expected: Vec<usize>,
    },

    #[error("operation {operation} failed: {message}")]
    Script { operation: String, message: String },

    #[error("value conversion failed: {0}")]
    Conversion(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Position;

    #[test]
    fn nested_call_errors_classify_by_root_cause() {
        let root = EvalAltResult::ErrorFunctionNotFound("qr_encode (&str)".into(), Position::NONE);
        let wrapped = EvalAltResult::ErrorInFunctionCall(
            "create".into(),
            String::new(),
            Box::new(root),
            Position::NONE,
        );
        assert_eq!(LoadError::from_eval(&wrapped).kind, FaultKind::Import);
    }

    #[test]
    fn thrown_values_are_runtime_faults() {
        let err = EvalAltResult::ErrorRuntime("boom".into(), Position::NONE);
        assert_eq!(LoadError::from_eval(&err).kind, FaultKind::Runtime);
    }

    #[test]
    fn fault_kind_display_is_snake_case() {
        assert_eq!(FaultKind::MissingEntryPoint.to_string(), "missing_entry_point");
    }
}
