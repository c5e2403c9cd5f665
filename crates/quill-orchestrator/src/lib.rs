//! Hub-and-spoke orchestration for Quill's research agents.
//!
//! A project-manager hub interprets the user's task, routes bounded
//! sub-tasks to specialist agents, and synthesises the final answer
//! when coverage is sufficient. State moves through the loop as
//! explicit deltas; every terminal path is a defined status.

pub mod pm_turn;
pub mod roles;
pub mod routing;
pub mod runtime;
pub mod state;

pub use pm_turn::ProjectManagerTurn;
pub use roles::{profile, RoleProfile};
pub use routing::{apply_route_policies, parse_routing, RoutingDecision};
pub use runtime::{HopSnapshot, Orchestrator, DEFAULT_MAX_ITERATIONS};
pub use state::{
    AgentRole, AgentState, RouteTarget, StateDelta, TaskResult, TaskStatus, CORE_SPECIALISTS,
    END_SENTINEL, SPECIALIST_ROLES,
};
