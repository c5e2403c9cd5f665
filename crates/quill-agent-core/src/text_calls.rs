//! Detection of tool calls embedded in plain assistant text.
//!
//! Some models narrate a JSON function-call payload instead of using
//! the structured tool-call channel. When the assistant text contains
//! such a payload it is promoted to a real tool call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use quill_ai::ToolCall;
use regex::Regex;

static TYPED_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)\{"type"\s*:\s*"function"\s*,\s*"name"\s*:\s*"([^"]+)"\s*,\s*"parameters"\s*:\s*(\{[^}]*\})\s*\}"#,
    )
    .expect("typed call pattern")
});

static BARE_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\{"name"\s*:\s*"([^"]+)"\s*,\s*"parameters"\s*:\s*(\{[^}]*\})\s*\}"#)
        .expect("bare call pattern")
});

static TEXT_CALL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Extracts text-embedded tool calls. The typed form wins; the bare
/// form is only consulted when the typed form matched nothing.
pub fn parse_text_tool_calls(text: &str) -> Vec<ToolCall> {
    for pattern in [&*TYPED_CALL_PATTERN, &*BARE_CALL_PATTERN] {
        let mut calls = Vec::new();
        for captures in pattern.captures_iter(text) {
            let (Some(name), Some(raw_args)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let Ok(arguments) = serde_json::from_str(raw_args.as_str()) else {
                continue;
            };
            let sequence = TEXT_CALL_COUNTER.fetch_add(1, Ordering::Relaxed);
            calls.push(ToolCall {
                id: format!("text_call_{sequence}"),
                name: name.as_str().to_string(),
                arguments,
            });
        }
        if !calls.is_empty() {
            return calls;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::parse_text_tool_calls;

    #[test]
    fn unit_parses_typed_function_call_payload() {
        let text = r#"I will fetch the data now.
{"type": "function", "name": "get_stock_price", "parameters": {"ticker": "AAPL"}}"#;
        let calls = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_stock_price");
        assert_eq!(calls[0].arguments["ticker"], "AAPL");
        assert!(calls[0].id.starts_with("text_call_"));
    }

    #[test]
    fn unit_parses_bare_call_payload_when_typed_form_absent() {
        let text = r#"{"name": "get_company_news", "parameters": {"ticker": "MSFT"}}"#;
        let calls = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_company_news");
    }

    #[test]
    fn functional_typed_matches_suppress_bare_matches() {
        let text = concat!(
            r#"{"type": "function", "name": "typed_tool", "parameters": {}}"#,
            "\n",
            r#"{"name": "bare_tool", "parameters": {}}"#,
        );
        let calls = parse_text_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "typed_tool");
    }

    #[test]
    fn regression_invalid_parameter_json_is_skipped() {
        let text = r#"{"name": "broken", "parameters": {oops}}"#;
        assert!(parse_text_tool_calls(text).is_empty());
    }

    #[test]
    fn regression_plain_prose_yields_no_calls() {
        assert!(parse_text_tool_calls("AAPL is trading at 150.0 today.").is_empty());
    }
}
