//! Prompt builders for every request sent to the code-generation service.

use crate::domain::{CapabilityRequest, GapAssessment};
use crate::runtime::FaultKind;

/// Module contract appended to every prompt that asks for source.
pub const MODULE_CONTRACT: &str = "\
Write a Rhai script module that follows this contract exactly:
- Define `fn create()` with no parameters. It returns an object map holding the capability state.
- Every other public function is an operation. Operations read and update state through `this`.
- Prefix helper functions with `_` or mark them `private` so they are not exposed.
- Operations return an object map `#{ success: true|false, message: \"...\", data: ... }` and never throw; wrap risky work in `try { } catch (err) { }`.
- `import` and `eval` are unavailable. File access is limited to these host functions, with paths relative to the workspace: \
write_text(path, text), append_text(path, text), read_text(path), file_exists(path), list_dir(path), make_dir(path), copy_file(from, to), now_iso().
Respond with ONLY the Rhai source, no explanations.";

/// Prompt asking whether existing actions suffice for `request`.
pub fn assessment(request: &CapabilityRequest, existing: &[String], digest: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyze this user request and decide whether it needs NEW specialized code.

User request: {text}
Available actions: {actions:?}
Existing capabilities: {existing:?}

Set can_handle=false only for tasks that clearly need specialized processing, \
custom formats, domain algorithms or integrations the available actions lack. \
File operations, application control, system commands, web search and simple \
data manipulation can be handled.

Respond with JSON in this format:
{{
    \"can_handle\": true/false,
    \"confidence\": 0.0-1.0,
    \"missing_capability\": \"what is missing, or null\",
    \"required_functions\": [\"specific functions needed\"],
    \"complexity_level\": \"simple/medium/complex\",
    \"estimated_lines_of_code\": number
}}

Be conservative: only report a gap for genuinely specialized tasks.",
        text = request.text,
        actions = request.available_actions,
    );
    push_context(&mut prompt, digest);
    prompt
}

/// Prompt asking for a new custom module.
pub fn generation(request: &str, assessment: &GapAssessment, digest: Option<&str>) -> String {
    let mut prompt = format!(
        "Generate a capability for this request.

User request: {request}
Missing capability: {missing}
Required functions: {functions:?}

Expose exactly one primary capability through the factory and give the main \
operation a descriptive verb name (for example `generate_...`, `create_...`, \
`process_...`).

{MODULE_CONTRACT}",
        missing = assessment.missing().unwrap_or("unspecified"),
        functions = assessment.required_functions,
    );
    push_context(&mut prompt, digest);
    prompt
}

/// Prompt asking for a refinement pass over a draft.
pub fn enhancement(source: &str, request: &str, assessment: &GapAssessment, digest: Option<&str>) -> String {
    let mut prompt = format!(
        "Improve this capability module so it fully serves the request.

User request: {request}
Missing capability: {missing}
Required functions: {functions:?}

Keep the factory and operation names, tighten error handling, and make every \
operation return the structured map.

CODE:
{source}

{MODULE_CONTRACT}",
        missing = assessment.missing().unwrap_or("unspecified"),
        functions = assessment.required_functions,
    );
    push_context(&mut prompt, digest);
    prompt
}

/// Prompt asking for a full corrected module after a classified failure.
pub fn correction(kind: FaultKind, source: &str, error: &str) -> String {
    let instructions = match kind {
        FaultKind::Syntax => "The module does not parse. Fix the syntax error.",
        FaultKind::Import => {
            "The module references a module or function that does not exist. \
             Remove the import or call and implement the functionality with \
             built-in Rhai functions and the listed host functions only."
        }
        FaultKind::MissingEntryPoint => {
            "The module has no valid factory. Add a public `fn create()` with no \
             parameters that returns the capability state as an object map, and \
             keep the existing operations."
        }
        FaultKind::Runtime => {
            "The module fails while running. Correct the logic errors, fix \
             variable references and scope issues (functions cannot see \
             top-level variables), and add error handling."
        }
        FaultKind::PolicyViolation => {
            "The module uses disallowed constructs. Remove them and achieve the \
             same result with the listed host functions."
        }
    };

    format!(
        "The following capability module has a {kind} error.

ERROR: {error}

{instructions}

CODE:
{source}

{MODULE_CONTRACT}"
    )
}

fn push_context(prompt: &mut String, digest: Option<&str>) {
    if let Some(digest) = digest.filter(|d| !d.trim().is_empty()) {
        prompt.push_str("\n\nContext from previous attempts: ");
        prompt.push_str(digest);
    }
}
