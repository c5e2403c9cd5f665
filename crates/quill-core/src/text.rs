/// Collapses all runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncates to at most `max_chars` characters, appending an ellipsis
/// when anything was cut. Char-exact so multi-byte content never splits.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let total_chars = text.chars().count();
    if total_chars <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    if max_chars == 1 {
        return "…".to_string();
    }

    let truncate_at = text
        .char_indices()
        .nth(max_chars - 1)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    let mut truncated = text[..truncate_at].to_string();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::{collapse_whitespace, truncate_chars};

    #[test]
    fn collapse_whitespace_flattens_newlines_and_tabs() {
        assert_eq!(collapse_whitespace("a\n\tb   c"), "a b c");
    }

    #[test]
    fn truncate_chars_is_char_exact() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "he…");
        assert_eq!(truncate_chars("héllo", 2), "h…");
        assert_eq!(truncate_chars("hello", 0), "");
        assert_eq!(truncate_chars("hello", 1), "…");
    }

    #[test]
    fn truncated_output_never_exceeds_budget() {
        for max in 0..8 {
            let out = truncate_chars("abcdefgh", max);
            assert!(out.chars().count() <= max);
        }
    }
}
