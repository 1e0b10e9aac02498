//! Pull source blocks and structured payloads out of free-text replies.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn trailing_comma_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").ok()).as_ref()
}

/// Strip markdown fencing from a reply, returning the first fenced block's body.
///
/// Unfenced replies are returned trimmed. An opening fence without a closing
/// one yields everything after the fence line.
pub fn strip_code_fences(reply: &str) -> String {
    let Some(open) = reply.find("```") else {
        return reply.trim().to_string();
    };

    let after_fence = &reply[open + 3..];
    // Skip the language tag, if any, up to the end of the fence line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];

    match body.find("```") {
        Some(close) => body[..close].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Locate the first balanced `{ ... }` object in `text`, honouring string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract a JSON object from a reply that may wrap it in prose or fences and
/// may contain trailing commas.
pub fn extract_json_payload(reply: &str) -> Option<Value> {
    let candidate_text = if reply.contains("```") {
        strip_code_fences(reply)
    } else {
        reply.trim().to_string()
    };

    let object = first_balanced_object(&candidate_text)
        .or_else(|| first_balanced_object(reply))?;
    let cleaned = match trailing_comma_re() {
        Some(re) => re.replace_all(object, "$1"),
        None => object.into(),
    };

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_tagged_fence() {
        let reply = "Here you go:\n```rhai\nfn create() { #{} }\n```\nEnjoy.";
        assert_eq!(strip_code_fences(reply), "fn create() { #{} }");
    }

    #[test]
    fn unfenced_reply_is_trimmed() {
        assert_eq!(strip_code_fences("  fn create() { 1 }\n"), "fn create() { 1 }");
    }

    #[test]
    fn unterminated_fence_keeps_body() {
        assert_eq!(strip_code_fences("```\nfn create() { 1 }"), "fn create() { 1 }");
    }

    #[test]
    fn extracts_payload_from_prose_with_trailing_comma() {
        let reply = r#"Sure! The verdict is {"can_handle": false, "required_functions": ["a",],} as requested."#;
        let v = extract_json_payload(reply).unwrap();
        assert_eq!(v["can_handle"], Value::Bool(false));
        assert_eq!(v["required_functions"][0], "a");
    }

    #[test]
    fn extracts_payload_from_fenced_json() {
        let reply = "```json\n{\"can_handle\": true, \"note\": \"braces } in strings\"}\n```";
        let v = extract_json_payload(reply).unwrap();
        assert_eq!(v["can_handle"], Value::Bool(true));
        assert_eq!(v["note"], "braces } in strings");
    }

    #[test]
    fn malformed_payload_yields_none() {
        assert!(extract_json_payload("I cannot answer that").is_none());
        assert!(extract_json_payload("{ not json at all").is_none());
    }

    #[test]
    fn trailing_comma_cleanup_is_available() {
        let re = trailing_comma_re().unwrap();
        assert_eq!(re.replace_all("[1, 2, ]", "$1"), "[1, 2]");
    }
}
