//! Capability requests and their normalized cache identity.

use serde::{Deserialize, Serialize};

/// A user request together with the built-in actions available to serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub text: String,
    pub available_actions: Vec<String>,
}

impl CapabilityRequest {
    pub fn new<I, S>(text: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            available_actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Cache identity: whitespace-collapsed lower-case text plus the sorted,
    /// de-duplicated action set.
    pub fn cache_key(&self) -> RequestKey {
        let text = self
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut actions: Vec<String> = self
            .available_actions
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        actions.sort();
        actions.dedup();

        RequestKey { text, actions }
    }
}

/// Normalized `(request, action-set)` pair used to key assessments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub text: String,
    pub actions: Vec<String>,
}
