//! Text processing utilities for untrusted model output

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fence pattern is valid");
}

/// Truncate text to a maximum number of characters with ellipsis
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        text.to_string()
    } else if max_length <= 3 {
        "...".to_string()
    } else {
        let head: String = text.chars().take(max_length - 3).collect();
        format!("{}...", head)
    }
}

/// Reduce a model response to the JSON object it most likely contains.
///
/// Models asked for "JSON only" still wrap answers in markdown fences or add a
/// sentence of preamble. This strips a fenced block if present, then slices
/// from the first `{` to the last `}`. The result is not guaranteed to parse.
pub fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    let body = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    }
}

/// Parse a model response into a JSON object.
///
/// Fails when the text is not JSON or when the top-level value is not an
/// object; the error string is suitable for the pipeline's error log.
pub fn parse_json_object(text: &str) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let candidate = extract_json_object(text);
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("invalid JSON ({}): {}", e, truncate(text.trim(), 120))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello world", 20), "hello world");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hi", 2), "hi");
        assert_eq!(truncate("hello", 3), "...");
        assert_eq!(truncate("épée à deux mains", 6), "épé...");
    }

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json_object(" {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_fenced_object() {
        let text = "Here is the plan:\n```json\n{\"title\": \"Graphs\"}\n```\nEnjoy!";
        assert_eq!(extract_json_object(text), "{\"title\": \"Graphs\"}");
    }

    #[test]
    fn test_extract_object_surrounded_by_prose() {
        let text = "Sure! {\"details\": [\"a\"], \"concepts\": []} Hope that helps.";
        assert_eq!(
            extract_json_object(text),
            "{\"details\": [\"a\"], \"concepts\": []}"
        );
    }

    #[test]
    fn test_parse_json_object_rejects_non_objects() {
        assert!(parse_json_object("[1, 2, 3]").is_err());
        assert!(parse_json_object("I cannot help with that").is_err());
        let map = parse_json_object("```\n{\"x\": true}\n```").unwrap();
        assert_eq!(map.get("x"), Some(&serde_json::Value::Bool(true)));
    }
}
