//! Disallowed-pattern scan over candidate source.

use serde::{Deserialize, Serialize};

/// What a scan finding does to the validation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Log findings and continue.
    #[default]
    Warn,
    /// Fail the pass with a `policy_violation` fault.
    Block,
}

/// Patterns flagged by default: dynamic evaluation, process control and
/// paths that reach outside the workspace.
pub fn default_disallowed_patterns() -> Vec<String> {
    [
        "eval(",
        "Fn(\"eval\")",
        "import ",
        "exit(",
        "system(",
        "spawn(",
        "exec(",
        "\"/etc/",
        "\"~/",
        "../",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// One occurrence of a disallowed pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFinding {
    pub pattern: String,
    /// 1-based line number.
    pub line: usize,
}

/// Report the first occurrence of each pattern found in `source`.
pub fn scan(source: &str, patterns: &[String]) -> Vec<ScanFinding> {
    patterns
        .iter()
        .filter_map(|pattern| {
            source
                .lines()
                .position(|line| line.contains(pattern.as_str()))
                .map(|idx| ScanFinding {
                    pattern: pattern.clone(),
                    line: idx + 1,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_occurrence_per_pattern() {
        let src = "fn create() { #{} }\nfn run() { eval(\"1\") }\nfn again() { eval(\"2\") }";
        let findings = scan(src, &default_disallowed_patterns());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pattern, "eval(");
        assert_eq!(findings[0].line, 2);
    }

    #[test]
    fn templates_are_clean() {
        let patterns = default_disallowed_patterns();
        for src in [
            crate::synth::templates::SPREADSHEET,
            crate::synth::templates::FILE_MANAGER,
            crate::synth::templates::DATA_PROCESSOR,
        ] {
            assert!(scan(src, &patterns).is_empty());
        }
    }
}
