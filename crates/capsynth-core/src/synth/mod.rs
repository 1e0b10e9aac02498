//! Candidate synthesis.
//!
//! Requests are classified into a closed category set by keyword. The fixed
//! categories are served from pre-validated templates with no service call;
//! everything else is generated from a prompt. An optional enhancement pass
//! resubmits the draft with the assessed context and falls back to the draft
//! when the service fails.

pub mod templates;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codegen::extract::strip_code_fences;
use crate::codegen::{CodeGenError, CodeGenService, GenerationRequest, PromptKind};
use crate::domain::GapAssessment;
use crate::prompts;

/// Capability category, chosen by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Spreadsheet,
    FileManager,
    DataProcessor,
    Custom,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheet",
            Self::FileManager => "file_manager",
            Self::DataProcessor => "data_processor",
            Self::Custom => "custom",
        }
    }

    /// Template source for the fixed categories.
    pub fn template(&self) -> Option<&'static str> {
        match self {
            Self::Spreadsheet => Some(templates::SPREADSHEET),
            Self::FileManager => Some(templates::FILE_MANAGER),
            Self::DataProcessor => Some(templates::DATA_PROCESSOR),
            Self::Custom => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Spreadsheet,
        &["spreadsheet", "excel", "csv", "table", "data entry", "xlsx"],
    ),
    (
        Category::FileManager,
        &["file", "folder", "directory", "copy", "move", "organize"],
    ),
    (
        Category::DataProcessor,
        &["analyze", "process", "filter", "data", "statistics"],
    ),
];

/// Classify a request; the first category with a matching keyword wins.
pub fn detect_category(request: &str) -> Category {
    let lower = request.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Custom)
}

/// `{category}_tool_{YYYYMMDD_HHMMSS}_{6 hex}`.
pub fn module_name_for(category: Category) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_tool_{}_{}", category.as_str(), stamp, &suffix[..6])
}

/// When to run the enhancement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisPolicy {
    pub enhance_generated: bool,
    pub enhance_templates: bool,
}

impl Default for SynthesisPolicy {
    fn default() -> Self {
        Self {
            enhance_generated: true,
            enhance_templates: false,
        }
    }
}

/// A synthesized, not yet validated module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub source: String,
    pub module_name: String,
    pub category: Category,
    pub from_template: bool,
    pub enhanced: bool,
}

pub struct CodeSynthesizer {
    service: Arc<dyn CodeGenService>,
    policy: SynthesisPolicy,
}

impl CodeSynthesizer {
    pub fn new(service: Arc<dyn CodeGenService>, policy: SynthesisPolicy) -> Self {
        Self { service, policy }
    }

    pub fn policy(&self) -> &SynthesisPolicy {
        &self.policy
    }

    /// Produce a candidate for `request`.
    ///
    /// Fails only when a custom module is needed and the service cannot
    /// produce any source.
    pub async fn generate(
        &self,
        request: &str,
        assessment: &GapAssessment,
        digest: Option<&str>,
    ) -> Result<Candidate, CodeGenError> {
        let category = detect_category(request);
        let module_name = module_name_for(category);

        let (source, from_template) = match category.template() {
            Some(template) => {
                info!(%category, module = %module_name, "using template");
                (template.trim().to_string(), true)
            }
            None => {
                let prompt = prompts::generation(request, assessment, digest);
                let reply = self
                    .service
                    .complete(&GenerationRequest::new(PromptKind::Generation, prompt))
                    .await?;
                let source = strip_code_fences(&reply);
                if source.is_empty() {
                    return Err(CodeGenError::Empty);
                }
                info!(%category, module = %module_name, "generated custom module");
                (source, false)
            }
        };

        let wants_enhancement = if from_template {
            self.policy.enhance_templates
        } else {
            self.policy.enhance_generated
        };

        let (source, enhanced) = if wants_enhancement {
            match self.enhance(&source, request, assessment, digest).await {
                Some(better) => (better, true),
                None => (source, false),
            }
        } else {
            (source, false)
        };

        Ok(Candidate {
            source,
            module_name,
            category,
            from_template,
            enhanced,
        })
    }

    /// Refine `source` with the assessed context. `None` means keep the draft.
    pub async fn enhance(
        &self,
        source: &str,
        request: &str,
        assessment: &GapAssessment,
        digest: Option<&str>,
    ) -> Option<String> {
        let prompt = prompts::enhancement(source, request, assessment, digest);
        match self
            .service
            .complete(&GenerationRequest::new(PromptKind::Enhancement, prompt))
            .await
        {
            Ok(reply) => {
                let enhanced = strip_code_fences(&reply);
                if enhanced.is_empty() {
                    warn!("enhancement returned no source, keeping draft");
                    None
                } else {
                    Some(enhanced)
                }
            }
            Err(e) => {
                warn!(error = %e, "enhancement failed, keeping draft");
                None
            }
        }
    }
}
