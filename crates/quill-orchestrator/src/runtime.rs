//! The hub-and-spoke hop loop.
//!
//! Every hop runs the manager, parses its routing decision, applies
//! the loop-prevention policies, and either terminates or runs the
//! chosen specialist. All terminal paths are explicit: completion,
//! iteration cap, deadline, cancellation, or manager failure.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use quill_agent_core::{CooperativeCancellationToken, SpecialistAgent, TurnContext};

use crate::pm_turn::ProjectManagerTurn;
use crate::routing::{apply_route_policies, parse_routing};
use crate::state::{
    AgentRole, AgentState, RouteTarget, StateDelta, TaskResult, TaskStatus,
};

/// Default hop cap for one task invocation.
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// One line of progress, emitted after every merged hop.
#[derive(Debug, Clone, Serialize)]
pub struct HopSnapshot {
    pub iteration: u32,
    pub agent: AgentRole,
    pub summary: String,
    pub tool_calls_made: u32,
    pub status: TaskStatus,
}

/// Public struct `Orchestrator` used across Quill components.
///
/// Owns the manager turn and the specialist agents, and drives state
/// through hops until a terminal status.
pub struct Orchestrator {
    manager: ProjectManagerTurn,
    specialists: BTreeMap<AgentRole, Arc<SpecialistAgent>>,
    cancellation: Option<CooperativeCancellationToken>,
    snapshots: Option<UnboundedSender<HopSnapshot>>,
    deadline: Option<Duration>,
}

impl Orchestrator {
    pub fn new(manager: ProjectManagerTurn) -> Self {
        Self {
            manager,
            specialists: BTreeMap::new(),
            cancellation: None,
            snapshots: None,
            deadline: None,
        }
    }

    pub fn register_specialist(&mut self, role: AgentRole, agent: Arc<SpecialistAgent>) {
        self.specialists.insert(role, agent);
    }

    pub fn set_cancellation_token(&mut self, token: CooperativeCancellationToken) {
        self.cancellation = Some(token);
    }

    /// Streams a [`HopSnapshot`] after every merged hop.
    pub fn set_snapshot_sender(&mut self, sender: UnboundedSender<HopSnapshot>) {
        self.snapshots = Some(sender);
    }

    /// Wall-clock budget for the whole invocation.
    pub fn set_deadline(&mut self, deadline: Duration) {
        self.deadline = Some(deadline);
    }

    /// Drives `state` to a terminal status and returns it.
    pub async fn run(&self, mut state: AgentState) -> AgentState {
        let started = tokio::time::Instant::now();

        loop {
            if let Some(token) = &self.cancellation {
                if token.is_cancelled() {
                    state.apply(terminal_delta(
                        TaskStatus::Failed,
                        "task cancelled by the caller",
                    ));
                    break;
                }
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    warn!(elapsed_ms = started.elapsed().as_millis() as u64, "deadline reached");
                    state.apply(terminal_delta(
                        TaskStatus::Failed,
                        "wall-clock deadline reached",
                    ));
                    break;
                }
            }
            if state.iteration >= state.max_iterations {
                warn!(iteration = state.iteration, "iteration cap reached");
                state.apply(terminal_delta(TaskStatus::Failed, "iteration cap reached"));
                break;
            }

            // Manager hop.
            let manager_delta = match self.manager.run(&state).await {
                Ok(delta) => delta,
                Err(err) => {
                    error!(error = %err, "manager turn failed");
                    state.apply(terminal_delta(
                        TaskStatus::Failed,
                        format!("project manager failed: {err}"),
                    ));
                    break;
                }
            };
            let manager_text = manager_delta
                .messages
                .first()
                .map(|message| message.text_content())
                .unwrap_or_default();
            let decision = apply_route_policies(&state, parse_routing(&manager_text));

            state.apply(manager_delta);
            state.next_agent = decision.target;
            state.iteration += 1;
            self.emit_snapshot(&state, AgentRole::ProjectManager);

            let role = match decision.target {
                RouteTarget::End => {
                    info!(iteration = state.iteration, "manager terminated the loop");
                    state.apply(StateDelta {
                        status: Some(TaskStatus::Completed),
                        ..StateDelta::default()
                    });
                    break;
                }
                RouteTarget::Role(role) => role,
            };

            // Specialist hop.
            let Some(agent) = self.specialists.get(&role) else {
                state.apply(terminal_delta(
                    TaskStatus::Failed,
                    format!("no agent registered for role {role}"),
                ));
                break;
            };
            info!(role = %role, sub_task_chars = decision.sub_task.chars().count(), "dispatching specialist");
            let context = TurnContext {
                task: state.task.clone(),
                sub_task: decision.sub_task.clone(),
                file_context: state.file_context.clone(),
                history: state.messages.clone(),
                images: state.image_contents.clone(),
            };
            let delta = match agent.run(&context).await {
                Ok(report) => {
                    let mut outputs = BTreeMap::new();
                    outputs.insert(role, report.summary.clone());
                    StateDelta {
                        messages: report.new_messages,
                        current_agent: Some(role),
                        results: vec![TaskResult {
                            agent: role,
                            summary: report.summary,
                            tool_calls_made: report.tool_calls_made,
                            status: TaskStatus::Completed,
                        }],
                        agent_outputs: outputs,
                        ..StateDelta::default()
                    }
                }
                Err(err) => {
                    // Specialist failure is isolated; the manager sees
                    // the error text and decides what to do next.
                    error!(role = %role, error = %err, "specialist failed");
                    let message =
                        format!("Agent {role} encountered an error and could not complete: {err}");
                    let mut outputs = BTreeMap::new();
                    outputs.insert(role, message.clone());
                    StateDelta {
                        messages: vec![quill_ai::Message::assistant_text(message.clone())],
                        current_agent: Some(role),
                        results: vec![TaskResult {
                            agent: role,
                            summary: message,
                            tool_calls_made: 0,
                            status: TaskStatus::Failed,
                        }],
                        agent_outputs: outputs,
                        ..StateDelta::default()
                    }
                }
            };
            state.apply(delta);
            self.emit_snapshot(&state, role);
        }

        self.emit_snapshot(&state, state.current_agent);
        state
    }

    fn emit_snapshot(&self, state: &AgentState, agent: AgentRole) {
        let Some(sender) = &self.snapshots else {
            return;
        };
        let summary = state
            .results
            .last()
            .map(|result| result.summary.clone())
            .unwrap_or_default();
        let tool_calls_made = state
            .results
            .last()
            .map(|result| result.tool_calls_made)
            .unwrap_or_default();
        // The receiver may have been dropped; progress is best-effort.
        let _ = sender.send(HopSnapshot {
            iteration: state.iteration,
            agent,
            summary,
            tool_calls_made,
            status: state.status,
        });
    }
}

fn terminal_delta(status: TaskStatus, error: impl Into<String>) -> StateDelta {
    StateDelta {
        status: Some(status),
        error: Some(error.into()),
        ..StateDelta::default()
    }
}
