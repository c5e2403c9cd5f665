//! Shared orchestration state and the delta-merge policies.
//!
//! State flows through the hop loop by value; each hop produces a
//! `StateDelta` that is merged, never an in-place mutation of shared
//! structures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use quill_agent_core::ImageAttachment;
use quill_ai::{Message, MessageRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `AgentRole` values.
pub enum AgentRole {
    ProjectManager,
    QuantResearcher,
    PortfolioAnalyst,
    SoftwareDeveloper,
    ResearchIntelligence,
}

/// Roles the router may delegate to.
pub const SPECIALIST_ROLES: &[AgentRole] = &[
    AgentRole::QuantResearcher,
    AgentRole::PortfolioAnalyst,
    AgentRole::SoftwareDeveloper,
    AgentRole::ResearchIntelligence,
];

/// Once all of these have reported, the router is pushed to terminate.
pub const CORE_SPECIALISTS: &[AgentRole] = &[
    AgentRole::ResearchIntelligence,
    AgentRole::QuantResearcher,
    AgentRole::PortfolioAnalyst,
];

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProjectManager => "project_manager",
            AgentRole::QuantResearcher => "quant_researcher",
            AgentRole::PortfolioAnalyst => "portfolio_analyst",
            AgentRole::SoftwareDeveloper => "software_developer",
            AgentRole::ResearchIntelligence => "research_intelligence",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "project_manager" => Some(AgentRole::ProjectManager),
            "quant_researcher" => Some(AgentRole::QuantResearcher),
            "portfolio_analyst" => Some(AgentRole::PortfolioAnalyst),
            "software_developer" => Some(AgentRole::SoftwareDeveloper),
            "research_intelligence" => Some(AgentRole::ResearchIntelligence),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentinel value meaning "stop and treat the sub-task as synthesis".
pub const END_SENTINEL: &str = "__end__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
/// Enumerates supported `RouteTarget` values.
pub enum RouteTarget {
    Role(AgentRole),
    End,
}

impl RouteTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteTarget::Role(role) => role.as_str(),
            RouteTarget::End => END_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `TaskStatus` values.
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One agent's contribution to the overall task.
pub struct TaskResult {
    pub agent: AgentRole,
    pub summary: String,
    pub tool_calls_made: u32,
    pub status: TaskStatus,
}

/// Shared state flowing through the orchestration loop.
///
/// `messages` and `results` are append-only; `agent_outputs` appends
/// per-role with a blank-line separator so the router sees a role's
/// full history across revisits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub task: String,
    pub current_agent: AgentRole,
    pub next_agent: RouteTarget,
    pub sub_task: String,
    pub results: Vec<TaskResult>,
    pub agent_outputs: BTreeMap<AgentRole, String>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: TaskStatus,
    pub error: String,
    pub file_context: String,
    pub image_contents: Vec<ImageAttachment>,
}

impl AgentState {
    /// Fresh state for one task invocation. `prior_history` seeds
    /// `messages` so follow-up questions see earlier exchanges; the
    /// task itself always lands as the newest user message.
    pub fn new_task(task: impl Into<String>, max_iterations: u32) -> Self {
        let task = task.into();
        Self {
            messages: vec![Message::user(task.clone())],
            task,
            current_agent: AgentRole::ProjectManager,
            next_agent: RouteTarget::Role(AgentRole::ProjectManager),
            sub_task: String::new(),
            results: Vec::new(),
            agent_outputs: BTreeMap::new(),
            iteration: 0,
            max_iterations,
            status: TaskStatus::InProgress,
            error: String::new(),
            file_context: String::new(),
            image_contents: Vec::new(),
        }
    }

    pub fn with_file_context(mut self, file_context: impl Into<String>) -> Self {
        self.file_context = file_context.into();
        self
    }

    pub fn with_images(mut self, images: Vec<ImageAttachment>) -> Self {
        self.image_contents = images;
        self
    }

    pub fn with_prior_history(mut self, history: Vec<Message>) -> Self {
        if history.is_empty() {
            return self;
        }
        let current = self.messages.split_off(0);
        self.messages = history;
        self.messages.extend(current);
        self
    }

    /// Merges one hop's delta under the append/replace policies.
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        self.results.extend(delta.results);
        for (role, output) in delta.agent_outputs {
            self.agent_outputs
                .entry(role)
                .and_modify(|existing| {
                    existing.push_str("\n\n");
                    existing.push_str(&output);
                })
                .or_insert(output);
        }
        if let Some(agent) = delta.current_agent {
            self.current_agent = agent;
        }
        if let Some(sub_task) = delta.sub_task {
            self.sub_task = sub_task;
        }
        if let Some(status) = delta.status {
            self.status = status;
        }
        if let Some(error) = delta.error {
            self.error = error;
        }
    }

    /// The last non-empty assistant message, which carries the final
    /// synthesis once the loop terminates.
    pub fn final_synthesis(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|message| {
                message.role == MessageRole::Assistant && !message.text_content().trim().is_empty()
            })
            .map(|message| message.text_content())
            .unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Fields a hop may change. Everything absent is left untouched.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub current_agent: Option<AgentRole>,
    pub sub_task: Option<String>,
    pub results: Vec<TaskResult>,
    pub agent_outputs: BTreeMap<AgentRole, String>,
    pub status: Option<TaskStatus>,
    pub error: Option<String>,
}
