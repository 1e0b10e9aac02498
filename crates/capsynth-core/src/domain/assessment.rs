//! Gap assessment verdicts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confidence reported by the allow-list fast path.
pub const FAST_PATH_CONFIDENCE: f64 = 0.95;

/// Confidence reported by the conservative fallback.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Fields the service payload must carry for a verdict to be accepted.
pub const REQUIRED_ASSESSMENT_FIELDS: [&str; 4] = [
    "can_handle",
    "confidence",
    "missing_capability",
    "required_functions",
];

/// Coarse complexity estimate returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
    Unknown,
}

impl Complexity {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "simple" => Self::Simple,
            "medium" => Self::Medium,
            "complex" => Self::Complex,
            _ => Self::Unknown,
        }
    }
}

/// Where a verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentSource {
    AllowList,
    Service,
    Fallback,
}

/// Decision on whether existing actions suffice or new code is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapAssessment {
    pub can_handle: bool,
    pub confidence: f64,
    pub missing_capability: Option<String>,
    pub required_functions: Vec<String>,
    pub complexity_level: Complexity,
    pub estimated_size: u32,
    pub source: AssessmentSource,
}

impl GapAssessment {
    pub fn fast_path() -> Self {
        Self {
            can_handle: true,
            confidence: FAST_PATH_CONFIDENCE,
            missing_capability: None,
            required_functions: Vec::new(),
            complexity_level: Complexity::Simple,
            estimated_size: 0,
            source: AssessmentSource::AllowList,
        }
    }

    /// Conservative default: assume the request can be handled, record why.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            can_handle: true,
            confidence: FALLBACK_CONFIDENCE,
            missing_capability: Some(reason.into()),
            required_functions: Vec::new(),
            complexity_level: Complexity::Unknown,
            estimated_size: 0,
            source: AssessmentSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == AssessmentSource::Fallback
    }

    /// Why the service gave no verdict, for fallback assessments only.
    pub fn fallback_reason(&self) -> Option<&str> {
        if self.is_fallback() {
            self.missing_capability.as_deref()
        } else {
            None
        }
    }

    /// The capability the verdict names as missing. Never a fallback reason.
    pub fn missing(&self) -> Option<&str> {
        if self.is_fallback() {
            None
        } else {
            self.missing_capability.as_deref()
        }
    }

    /// Build a service verdict from a parsed payload.
    ///
    /// Returns the name of the first missing or mistyped required field on failure.
    pub fn from_payload(payload: &Value) -> Result<Self, String> {
        let obj = payload
            .as_object()
            .ok_or_else(|| "payload is not an object".to_string())?;

        if let Some(field) = REQUIRED_ASSESSMENT_FIELDS
            .iter()
            .find(|f| !obj.contains_key(**f))
        {
            return Err(format!("missing field: {field}"));
        }

        let can_handle = obj["can_handle"]
            .as_bool()
            .ok_or_else(|| "can_handle is not a boolean".to_string())?;
        let confidence = obj["confidence"]
            .as_f64()
            .ok_or_else(|| "confidence is not a number".to_string())?
            .clamp(0.0, 1.0);
        let missing_capability = match &obj["missing_capability"] {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        let required_functions = match &obj["required_functions"] {
            Value::Array(items) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Value::Null => Vec::new(),
            _ => return Err("required_functions is not a list".to_string()),
        };
        let complexity_level = obj
            .get("complexity_level")
            .and_then(Value::as_str)
            .map(Complexity::parse)
            .unwrap_or(Complexity::Unknown);
        let estimated_size = obj
            .get("estimated_lines_of_code")
            .or_else(|| obj.get("estimated_size"))
            .and_then(Value::as_u64)
            .map(|n| n.min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0);

        Ok(Self {
            can_handle,
            confidence,
            missing_capability,
            required_functions,
            complexity_level,
            estimated_size,
            source: AssessmentSource::Service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_payload_accepts_full_schema() {
        let payload = json!({
            "can_handle": false,
            "confidence": 0.9,
            "missing_capability": "QR code rendering",
            "required_functions": ["encode", "save_png"],
            "complexity_level": "medium",
            "estimated_lines_of_code": 120
        });
        let a = GapAssessment::from_payload(&payload).unwrap();
        assert!(!a.can_handle);
        assert_eq!(a.missing_capability.as_deref(), Some("QR code rendering"));
        assert_eq!(a.required_functions.len(), 2);
        assert_eq!(a.complexity_level, Complexity::Medium);
        assert_eq!(a.estimated_size, 120);
        assert_eq!(a.source, AssessmentSource::Service);
    }

    #[test]
    fn from_payload_rejects_missing_field() {
        let payload = json!({"can_handle": false, "confidence": 0.9, "missing_capability": null});
        let err = GapAssessment::from_payload(&payload).unwrap_err();
        assert!(err.contains("required_functions"));
    }

    #[test]
    fn fallback_is_conservative() {
        let a = GapAssessment::fallback("JSON parsing failed");
        assert!(a.can_handle);
        assert_eq!(a.confidence, FALLBACK_CONFIDENCE);
        assert!(a.is_fallback());
        assert_eq!(a.fallback_reason(), Some("JSON parsing failed"));
        assert_eq!(a.missing(), None);
    }
}
