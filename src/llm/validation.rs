//! LLM Response Parsing
//!
//! Tolerant JSON extraction for model output. Handles the common
//! failure shapes: markdown code fences, JSON embedded in explanatory
//! prose, and stray control characters. Anything beyond that is a
//! `ParseError` the router may retry.

use serde_json::Value;
use tracing::debug;

use crate::types::{ErrorCategory, ProviderError, Result};

/// Extract and parse a JSON value from raw model output.
pub fn extract_json(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fences(raw.trim());

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }

    // Fall back to the outermost object or array embedded in prose
    debug!("direct JSON parse failed, scanning for embedded payload");
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(candidate) = outermost_span(&cleaned, open, close)
            && let Ok(value) = serde_json::from_str::<Value>(candidate)
        {
            return Ok(value);
        }
    }

    Err(ProviderError::new(
        ErrorCategory::ParseError,
        format!(
            "unparseable model output: {}...",
            cleaned.chars().take(120).collect::<String>()
        ),
    )
    .into())
}

/// Extract a JSON array of strings, dropping non-string entries.
pub fn extract_string_array(raw: &str) -> Result<Vec<String>> {
    let value = extract_json(raw)?;
    let items = value.as_array().ok_or_else(|| {
        ProviderError::new(ErrorCategory::ParseError, "expected a JSON array")
    })?;

    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn strip_code_fences(s: &str) -> String {
    let s = s.trim_start_matches('\u{feff}').trim();
    if !s.starts_with("```") {
        return s.to_string();
    }

    let without_open = match s.find('\n') {
        Some(idx) => &s[idx + 1..],
        None => s,
    };
    without_open
        .trim_end()
        .trim_end_matches("```")
        .trim()
        .to_string()
}

fn outermost_span(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    (end > start).then(|| &s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let raw = "Here is the plan you asked for:\n{\"subtopics\": []}\nHope that helps!";
        assert_eq!(extract_json(raw).unwrap(), json!({"subtopics": []}));
    }

    #[test]
    fn test_array_in_prose() {
        let raw = "Sure:\n[\"one\", \"two\"]";
        assert_eq!(
            extract_string_array(raw).unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn test_string_array_drops_non_strings() {
        let raw = r#"["a", 1, "b", null]"#;
        assert_eq!(
            extract_string_array(raw).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let result = extract_json("no json here at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_non_array_rejected_for_string_array() {
        assert!(extract_string_array(r#"{"a": 1}"#).is_err());
    }
}
