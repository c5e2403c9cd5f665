//! Layered extraction of the router's decision from free text.
//!
//! The router is instructed to answer with a JSON object carrying
//! `next_agent` and `sub_task`, but model output drifts: fenced blocks,
//! bare JSON, unescaped newlines inside string values, or prose that
//! merely names a role. The fallback chain here never fails; the worst
//! case resolves to termination with an empty sub-task.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::state::{AgentRole, AgentState, RouteTarget, CORE_SPECIALISTS, SPECIALIST_ROLES};

static FENCED_JSON_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("fenced json pattern"),
        Regex::new(r"(?s)```\s*(\{.*?\})\s*```").expect("fenced block pattern"),
    ]
});

static NEXT_AGENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""next_agent"\s*:\s*"([^"]*)""#).expect("next_agent pattern"));

static SUB_TASK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"sub_task"\s*:\s*"(.*)"#).expect("sub_task pattern"));

static TRAILING_JSON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*,?\s*\}\s*$"#).expect("trailing json pattern"));

const TERMINATION_SYNONYMS: &[&str] = &["end", "__end__", "done", "finish", "complete"];

/// Regex-recovered sub-tasks shorter than this are treated as noise.
const MIN_RECOVERED_SUB_TASK_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `RoutingDecision` used across Quill components.
pub struct RoutingDecision {
    pub target: RouteTarget,
    pub sub_task: String,
}

impl RoutingDecision {
    fn end() -> Self {
        Self {
            target: RouteTarget::End,
            sub_task: String::new(),
        }
    }
}

/// Pure text-to-decision extraction; loop policies live in
/// [`apply_route_policies`].
pub fn parse_routing(text: &str) -> RoutingDecision {
    // 1. Fenced JSON block.
    for pattern in FENCED_JSON_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let Some(block) = captures.get(1) else {
                continue;
            };
            if let Some(decision) = decision_from_json(block.as_str()) {
                return decision;
            }
        }
    }

    // 2. The whole trimmed text as bare JSON.
    if let Some(decision) = decision_from_json(text.trim()) {
        return decision;
    }

    // 3. Regex field extraction; survives unescaped newlines inside
    //    the sub_task value.
    if let Some(captures) = NEXT_AGENT_PATTERN.captures(text) {
        let candidate = normalize_candidate(&captures[1]);
        if let Some(target) = candidate_to_target(&candidate) {
            let sub_task = SUB_TASK_PATTERN
                .captures(text)
                .map(|m| clean_recovered_value(&m[1]))
                .unwrap_or_default();
            return RoutingDecision { target, sub_task };
        }
    }

    // 4. Role-name substring scan.
    let lowered = text.to_lowercase();
    for role in SPECIALIST_ROLES {
        if lowered.contains(role.as_str()) {
            return RoutingDecision {
                target: RouteTarget::Role(*role),
                sub_task: String::new(),
            };
        }
    }

    // 5. Nothing matched; never deadlock on unparseable output.
    RoutingDecision::end()
}

/// Loop-prevention and coverage policies applied by the state machine
/// on top of the raw parse.
pub fn apply_route_policies(state: &AgentState, decision: RoutingDecision) -> RoutingDecision {
    let RouteTarget::Role(role) = decision.target else {
        return decision;
    };

    let already_reported = state.agent_outputs.contains_key(&role);

    if already_reported && decision.sub_task.trim().is_empty() {
        warn!(
            role = %role,
            "router re-routed to a reported specialist with no new sub-task, forcing termination"
        );
        return RoutingDecision::end();
    }

    let core_done = CORE_SPECIALISTS
        .iter()
        .all(|core| state.agent_outputs.contains_key(core));
    if core_done && already_reported {
        warn!(
            role = %role,
            "all core specialists reported, overriding revisit with termination"
        );
        return RoutingDecision::end();
    }

    if already_reported {
        info!(
            role = %role,
            sub_task = %decision.sub_task.chars().take(80).collect::<String>(),
            "revisiting a reported specialist with a new sub-task"
        );
    }

    decision
}

/// Pulls just the `sub_task` field out of router output, for the delta
/// the router turn produces. Same layered order as [`parse_routing`].
pub fn extract_sub_task(text: &str) -> String {
    for pattern in FENCED_JSON_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let Some(block) = captures.get(1) else {
                continue;
            };
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(block.as_str()) {
                if let Some(sub_task) = map.get("sub_task").and_then(Value::as_str) {
                    return sub_task.to_string();
                }
            }
        }
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        if let Some(sub_task) = map.get("sub_task").and_then(Value::as_str) {
            return sub_task.to_string();
        }
    }

    if let Some(captures) = SUB_TASK_PATTERN.captures(text) {
        let recovered = clean_recovered_value(&captures[1]);
        if recovered.chars().count() > MIN_RECOVERED_SUB_TASK_CHARS {
            return recovered;
        }
    }

    String::new()
}

fn decision_from_json(raw: &str) -> Option<RoutingDecision> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return None;
    };
    let candidate = normalize_candidate(map.get("next_agent").and_then(Value::as_str)?);
    let target = candidate_to_target(&candidate)?;
    let sub_task = map
        .get("sub_task")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(RoutingDecision { target, sub_task })
}

fn normalize_candidate(raw: &str) -> String {
    let candidate = raw.trim().to_lowercase();
    if TERMINATION_SYNONYMS.contains(&candidate.as_str()) {
        return crate::state::END_SENTINEL.to_string();
    }
    candidate
}

fn candidate_to_target(candidate: &str) -> Option<RouteTarget> {
    if candidate == crate::state::END_SENTINEL {
        return Some(RouteTarget::End);
    }
    let role = AgentRole::parse(candidate)?;
    // The router never routes to itself.
    if role == AgentRole::ProjectManager {
        return None;
    }
    Some(RouteTarget::Role(role))
}

/// Strips the trailing JSON punctuation a regex-recovered string value
/// drags along.
fn clean_recovered_value(raw: &str) -> String {
    let mut value = raw.trim_end().to_string();
    if let Some(stripped) = value.strip_suffix("\"}") {
        value = stripped.to_string();
    } else if let Some(stripped) = value.strip_suffix('"') {
        value = stripped.to_string();
    }
    TRAILING_JSON_PATTERN.replace(&value, "").into_owned()
}
