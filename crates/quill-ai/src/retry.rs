//! Retry policy for provider HTTP calls.
//!
//! Throttling, transient server failures, and dropped connections are
//! retried with doubling backoff under a wall-clock budget. A
//! `Retry-After` header raises the floor of the computed delay.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

/// How the OpenAI-compatible client spaces and bounds its retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    /// Wall-clock allowance for the whole attempt sequence; zero
    /// disables the budget.
    pub budget: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            budget: Duration::from_secs(45),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Timeouts, conflicts, throttling, and server-side failures.
    pub fn retryable_status(status: u16) -> bool {
        matches!(status, 408 | 409 | 425 | 429) || status >= 500
    }

    pub fn retryable_transport_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
    }

    /// Reads a `Retry-After` header as either delta-seconds or an
    /// HTTP date; a date already in the past means retry immediately.
    pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
        let raw = headers.get("retry-after")?.to_str().ok()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(seconds) = raw.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
        let wait_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
        Some(Duration::from_millis(u64::try_from(wait_ms).unwrap_or(0)))
    }

    /// Delay before retry `attempt` (zero-based), honoring the
    /// provider's `Retry-After` floor when one was sent.
    pub fn delay_before(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        let exponent = u32::try_from(attempt.min(6)).unwrap_or(6);
        let backoff = self.base_delay.saturating_mul(1 << exponent);
        let delay = if self.jitter {
            jittered(backoff)
        } else {
            backoff
        };
        match retry_after {
            Some(floor) => delay.max(floor),
            None => delay,
        }
    }

    /// True when waiting `delay` still fits the remaining budget.
    pub fn within_budget(&self, elapsed: Duration, delay: Duration) -> bool {
        if self.budget.is_zero() {
            return true;
        }
        elapsed.saturating_add(delay) <= self.budget
    }
}

/// Draws a delay in [50%, 100%] of `backoff` from the clock's
/// sub-millisecond noise.
fn jittered(backoff: Duration) -> Duration {
    let half = backoff / 2;
    let span_ms = (backoff - half).as_millis() as u64;
    if span_ms == 0 {
        return backoff;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let draw = (nanos ^ (nanos >> 13)) % (span_ms + 1);
    half + Duration::from_millis(draw)
}
