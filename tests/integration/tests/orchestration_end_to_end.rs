//! End-to-end orchestration runs against scripted model clients: the
//! manager routes, specialists execute tools, and the loop terminates
//! through each of its designed exits.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use quill_agent_core::{AgentTool, SpecialistAgent, SpecialistConfig, ToolExecutionResult};
use quill_ai::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, FallbackChain, LlmClient, Message,
    ToolDefinition,
};
use quill_orchestrator::{
    AgentRole, AgentState, Orchestrator, ProjectManagerTurn, TaskStatus,
};

struct ScriptedClient {
    script: Mutex<VecDeque<Result<ChatResponse, AiError>>>,
    seen_models: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(script: Vec<Result<ChatResponse, AiError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen_models: Mutex::new(Vec::new()),
        })
    }

    fn models_seen(&self) -> Vec<String> {
        self.seen_models.lock().expect("models lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.seen_models
            .lock()
            .expect("models lock")
            .push(request.model.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(AiError::InvalidResponse("script exhausted".to_string())))
    }
}

struct StubPriceTool;

#[async_trait]
impl AgentTool for StubPriceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_stock_price".to_string(),
            description: "Fetch the latest quote for a ticker".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::ok(json!({ "ticker": "AAPL", "price": 150.0 }))
    }
}

struct OfflineTool;

#[async_trait]
impl AgentTool for OfflineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_stock_price".to_string(),
            description: "Fetch the latest quote for a ticker".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::error(json!({ "error": "market data feed unreachable" }))
    }
}

fn ok_response(message: Message) -> Result<ChatResponse, AiError> {
    Ok(ChatResponse {
        message,
        finish_reason: Some("stop".to_string()),
        usage: ChatUsage::default(),
    })
}

fn route_response(next_agent: &str, sub_task: &str) -> Result<ChatResponse, AiError> {
    ok_response(Message::assistant_text(
        json!({
            "next_agent": next_agent,
            "reasoning": "scripted",
            "sub_task": sub_task,
        })
        .to_string(),
    ))
}

fn tool_call_message(name: &str, arguments: Value) -> Message {
    Message::assistant_blocks(vec![ContentBlock::ToolCall {
        id: "call-1".to_string(),
        name: name.to_string(),
        arguments,
    }])
}

fn orchestrator_with_manager(manager_client: Arc<ScriptedClient>) -> Orchestrator {
    Orchestrator::new(ProjectManagerTurn::new(
        manager_client,
        "You are the routing project manager.",
        "manager-model".to_string(),
    ))
}

fn specialist(
    role: AgentRole,
    client: Arc<ScriptedClient>,
    tools: Vec<Arc<dyn AgentTool>>,
) -> Arc<SpecialistAgent> {
    let mut config = SpecialistConfig::new(role.as_str(), "You are a specialist.");
    config.model = "model-a".to_string();
    let mut agent = SpecialistAgent::new(client, Arc::new(FallbackChain::new()), config);
    agent.register_tools(tools);
    Arc::new(agent)
}

#[tokio::test]
async fn functional_task_routes_specialist_then_terminates() {
    let manager_client = ScriptedClient::new(vec![
        route_response("quant_researcher", "Get the latest AAPL price and report it."),
        route_response(
            "__end__",
            "AAPL last traded at 150.0; no further analysis required.",
        ),
    ]);
    let specialist_client = ScriptedClient::new(vec![
        ok_response(tool_call_message("get_stock_price", json!({ "ticker": "AAPL" }))),
        ok_response(Message::assistant_text("AAPL last traded at 150.0.")),
    ]);

    let mut orchestrator = orchestrator_with_manager(manager_client);
    orchestrator.register_specialist(
        AgentRole::QuantResearcher,
        specialist(
            AgentRole::QuantResearcher,
            specialist_client,
            vec![Arc::new(StubPriceTool)],
        ),
    );

    let state = orchestrator.run(AgentState::new_task("What is AAPL worth?", 15)).await;

    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(state.iteration, 2);
    assert!(state.agent_outputs[&AgentRole::QuantResearcher].contains("150.0"));
    assert!(state.final_synthesis().contains("150.0"));

    // Manager routing, specialist report, manager termination.
    assert_eq!(state.results.len(), 3);
    let quant = &state.results[1];
    assert_eq!(quant.agent, AgentRole::QuantResearcher);
    assert_eq!(quant.tool_calls_made, 1);
    assert_eq!(quant.status, TaskStatus::Completed);
}

#[tokio::test]
async fn functional_iteration_cap_bounds_the_conversation() {
    let manager_client = ScriptedClient::new(vec![
        route_response("quant_researcher", "Compute AAPL momentum."),
        route_response("quant_researcher", "Now compute AAPL volatility."),
        route_response("quant_researcher", "Now compute AAPL drawdown."),
    ]);
    let specialist_client = ScriptedClient::new(vec![
        ok_response(Message::assistant_text("Momentum is 0.85.")),
        ok_response(Message::assistant_text("Volatility is 22%.")),
        ok_response(Message::assistant_text("Max drawdown is 18%.")),
    ]);

    let mut orchestrator = orchestrator_with_manager(manager_client);
    orchestrator.register_specialist(
        AgentRole::QuantResearcher,
        specialist(AgentRole::QuantResearcher, specialist_client, Vec::new()),
    );

    let state = orchestrator
        .run(AgentState::new_task("Endless quant work", 3))
        .await;

    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(state.error, "iteration cap reached");
    assert_eq!(state.iteration, 3);
}

#[tokio::test]
async fn functional_empty_revisit_is_coerced_to_termination() {
    let manager_client = ScriptedClient::new(vec![
        route_response("quant_researcher", "Get the latest AAPL price."),
        // Re-routes to a specialist that already reported, with nothing
        // new to ask. The loop guard turns this into termination.
        route_response("quant_researcher", ""),
    ]);
    let specialist_client = ScriptedClient::new(vec![ok_response(Message::assistant_text(
        "AAPL last traded at 150.0.",
    ))]);

    let mut orchestrator = orchestrator_with_manager(manager_client);
    orchestrator.register_specialist(
        AgentRole::QuantResearcher,
        specialist(AgentRole::QuantResearcher, specialist_client, Vec::new()),
    );

    let state = orchestrator
        .run(AgentState::new_task("What is AAPL worth?", 15))
        .await;

    assert_eq!(state.status, TaskStatus::Completed);
    // One specialist visit only, despite the second routing attempt.
    let quant_visits = state
        .results
        .iter()
        .filter(|result| result.agent == AgentRole::QuantResearcher)
        .count();
    assert_eq!(quant_visits, 1);
}

#[tokio::test]
async fn functional_core_coverage_forces_termination_on_revisit() {
    let manager_client = ScriptedClient::new(vec![
        route_response("research_intelligence", "Gather recent AAPL news."),
        route_response("quant_researcher", "Compute AAPL return statistics."),
        route_response("portfolio_analyst", "Assess AAPL within a tech portfolio."),
        // All core specialists have reported; even a fresh sub-task for
        // a reported role must terminate instead of looping.
        route_response("quant_researcher", "Re-check the return statistics once more."),
    ]);
    let research_client = ScriptedClient::new(vec![ok_response(Message::assistant_text(
        "Coverage is positive on the product cycle.",
    ))]);
    let quant_client = ScriptedClient::new(vec![ok_response(Message::assistant_text(
        "Annualized return 14%, volatility 22%.",
    ))]);
    let portfolio_client = ScriptedClient::new(vec![ok_response(Message::assistant_text(
        "Position sizing looks reasonable at 4%.",
    ))]);

    let mut orchestrator = orchestrator_with_manager(manager_client);
    orchestrator.register_specialist(
        AgentRole::ResearchIntelligence,
        specialist(AgentRole::ResearchIntelligence, research_client, Vec::new()),
    );
    orchestrator.register_specialist(
        AgentRole::QuantResearcher,
        specialist(AgentRole::QuantResearcher, quant_client, Vec::new()),
    );
    orchestrator.register_specialist(
        AgentRole::PortfolioAnalyst,
        specialist(AgentRole::PortfolioAnalyst, portfolio_client, Vec::new()),
    );

    let state = orchestrator
        .run(AgentState::new_task("Full AAPL review", 15))
        .await;

    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(state.agent_outputs.len(), 3);
    assert_eq!(state.iteration, 4);
}

#[tokio::test]
async fn functional_recoverable_model_error_swaps_and_completes() {
    let manager_client = ScriptedClient::new(vec![
        route_response("quant_researcher", "Get the latest AAPL price."),
        route_response("__end__", "AAPL last traded at 150.0."),
    ]);
    let specialist_client = ScriptedClient::new(vec![
        Err(AiError::HttpStatus {
            status: 503,
            body: "model overloaded".to_string(),
        }),
        ok_response(Message::assistant_text("AAPL last traded at 150.0.")),
    ]);

    let mut config = SpecialistConfig::new("quant_researcher", "You are a specialist.");
    config.model = "model-a".to_string();
    config.fallback_candidates = vec!["model-a".to_string(), "model-b".to_string()];
    let agent = SpecialistAgent::new(
        specialist_client.clone(),
        Arc::new(FallbackChain::new()),
        config,
    );

    let mut orchestrator = orchestrator_with_manager(manager_client);
    orchestrator.register_specialist(AgentRole::QuantResearcher, Arc::new(agent));

    let state = orchestrator
        .run(AgentState::new_task("What is AAPL worth?", 15))
        .await;

    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(specialist_client.models_seen(), vec!["model-a", "model-b"]);
    assert!(state.final_synthesis().contains("150.0"));
}

#[tokio::test]
async fn regression_tool_failure_surfaces_in_the_report_not_the_status() {
    let manager_client = ScriptedClient::new(vec![
        route_response("quant_researcher", "Get the latest AAPL price."),
        route_response("__end__", "Market data was unavailable; try again later."),
    ]);
    let specialist_client = ScriptedClient::new(vec![
        ok_response(tool_call_message("get_stock_price", json!({ "ticker": "AAPL" }))),
        ok_response(Message::assistant_text(
            "The market data feed is unreachable; no fresh quote available.",
        )),
    ]);

    let mut orchestrator = orchestrator_with_manager(manager_client);
    orchestrator.register_specialist(
        AgentRole::QuantResearcher,
        specialist(
            AgentRole::QuantResearcher,
            specialist_client,
            vec![Arc::new(OfflineTool)],
        ),
    );

    let state = orchestrator
        .run(AgentState::new_task("What is AAPL worth?", 15))
        .await;

    // A broken tool degrades the answer, never the run.
    assert_eq!(state.status, TaskStatus::Completed);
    assert!(state.error.is_empty());
    let quant = state
        .results
        .iter()
        .find(|result| result.agent == AgentRole::QuantResearcher)
        .expect("quant result");
    assert_eq!(quant.tool_calls_made, 1);
    assert!(quant.summary.contains("unreachable"));
}
