//! Session-wide model fallback chain.
//!
//! Tracks models that failed during this process so retries move down
//! the candidate list instead of hammering a known-bad model.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `FallbackDecision` values.
pub enum FallbackDecision {
    /// Switch to this model and retry.
    Next(String),
    /// No viable alternative; callers return partial results.
    Exhausted,
}

#[derive(Debug, Default)]
/// Public struct `FallbackChain` used across Quill components.
pub struct FallbackChain {
    failed: Mutex<HashSet<String>>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent within one reset cycle.
    pub fn mark_failed(&self, model: &str) {
        let mut failed = match self.failed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if failed.insert(model.to_string()) {
            warn!(model = short_model_name(model), "marked model as failed");
        }
    }

    pub fn is_failed(&self, model: &str) -> bool {
        let failed = match self.failed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        failed.contains(model)
    }

    /// Marks `failing` failed and picks the first candidate not yet
    /// marked. When every candidate has failed the set is cleared and
    /// the top of the list is tried again; if that pick is the model
    /// that just failed there is nothing left to try.
    pub fn next_candidate(&self, candidates: &[String], failing: &str) -> FallbackDecision {
        self.mark_failed(failing);

        if candidates.is_empty() {
            return FallbackDecision::Exhausted;
        }

        let mut failed = match self.failed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let pick = match candidates
            .iter()
            .find(|candidate| !failed.contains(candidate.as_str()))
        {
            Some(candidate) => candidate.clone(),
            None => {
                warn!("all models marked failed, resetting failure list");
                failed.clear();
                candidates[0].clone()
            }
        };

        if pick == failing {
            return FallbackDecision::Exhausted;
        }

        info!(
            from = short_model_name(failing),
            to = short_model_name(&pick),
            "switching model"
        );
        FallbackDecision::Next(pick)
    }
}

fn short_model_name(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::{FallbackChain, FallbackDecision};

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn unit_picks_first_unfailed_candidate() {
        let chain = FallbackChain::new();
        let list = candidates(&["model-a", "model-b", "model-c"]);

        assert_eq!(
            chain.next_candidate(&list, "model-a"),
            FallbackDecision::Next("model-b".to_string())
        );
        assert_eq!(
            chain.next_candidate(&list, "model-b"),
            FallbackDecision::Next("model-c".to_string())
        );
    }

    #[test]
    fn functional_reset_after_exhaustion_returns_to_top() {
        let chain = FallbackChain::new();
        let list = candidates(&["model-a", "model-b"]);

        chain.mark_failed("model-a");
        // model-b failing empties the list; reset re-offers model-a.
        assert_eq!(
            chain.next_candidate(&list, "model-b"),
            FallbackDecision::Next("model-a".to_string())
        );
        assert!(!chain.is_failed("model-b"));
    }

    #[test]
    fn functional_exhausted_when_reset_yields_the_failing_model() {
        let chain = FallbackChain::new();
        let list = candidates(&["model-a"]);

        assert_eq!(
            chain.next_candidate(&list, "model-a"),
            FallbackDecision::Exhausted
        );
    }

    #[test]
    fn regression_empty_candidate_list_is_exhausted_not_panic() {
        let chain = FallbackChain::new();
        assert_eq!(
            chain.next_candidate(&[], "model-a"),
            FallbackDecision::Exhausted
        );
    }

    #[test]
    fn unit_mark_failed_is_idempotent() {
        let chain = FallbackChain::new();
        chain.mark_failed("model-a");
        chain.mark_failed("model-a");
        assert!(chain.is_failed("model-a"));
    }
}
