//! Failure classification for model calls.
//!
//! Provider failures fall into two buckets: ones worth retrying on a
//! different model (outages, throttling, malformed tool-call output)
//! and ones that will fail the same way everywhere.

/// Substrings that mark a provider failure as worth a model swap.
const RECOVERABLE_MARKERS: &[&str] = &[
    "no healthy upstream",
    "model not found",
    "404",
    "503",
    "502",
    "unavailable",
    "not available",
    "timed out",
    "timeout",
    "read timeout",
    "connect timeout",
    "400",
    "invalid_request_error",
    "missing tool calls",
    "tool_calls_section",
    "malformed",
    "429",
    "rate limit",
    "rate_limit",
    "too many requests",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `FailureKind` values.
pub enum FailureKind {
    /// A different model may succeed; swap and retry.
    Recoverable,
    /// Retrying elsewhere will not help; propagate.
    Fatal,
}

/// Classifies a failure by its rendered message.
pub fn classify_failure(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    if RECOVERABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        FailureKind::Recoverable
    } else {
        FailureKind::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_failure, FailureKind};

    #[test]
    fn unit_rate_limits_and_outages_are_recoverable() {
        assert_eq!(
            classify_failure("429 Too Many Requests"),
            FailureKind::Recoverable
        );
        assert_eq!(
            classify_failure("upstream returned 503 Service Unavailable"),
            FailureKind::Recoverable
        );
        assert_eq!(
            classify_failure("request timed out after 50s"),
            FailureKind::Recoverable
        );
    }

    #[test]
    fn unit_malformed_tool_call_output_is_recoverable() {
        assert_eq!(
            classify_failure("provider rejected malformed tool_calls_section payload"),
            FailureKind::Recoverable
        );
    }

    #[test]
    fn functional_auth_failures_are_fatal() {
        assert_eq!(
            classify_failure("401 Unauthorized: invalid api key"),
            FailureKind::Fatal
        );
        assert_eq!(classify_failure("permission denied"), FailureKind::Fatal);
    }
}
