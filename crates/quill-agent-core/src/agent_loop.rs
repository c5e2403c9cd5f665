//! The bounded per-role conversational loop.
//!
//! One invocation builds a clean two-message working set, then runs up
//! to `MAX_TOOL_ROUNDS` model/tool round trips under the context
//! budget, swapping models on recoverable failures. Only the new
//! messages and a capped summary leave the invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use quill_ai::{
    ChatRequest, ContentBlock, FallbackChain, FallbackDecision, LlmClient, MediaSource, Message,
    MessageRole,
};
use quill_core::text::truncate_chars;

use crate::context_budget::{
    compact_older_tool_results, context_chars, hard_trim_context, MAX_TOTAL_CONTEXT_CHARS,
};
use crate::errors::{classify_failure, FailureKind};
use crate::text_calls::parse_text_tool_calls;
use crate::{AgentError, AgentTool, CooperativeCancellationToken, ToolExecutionResult};

/// Maximum tool-call round trips per invocation.
pub const MAX_TOOL_ROUNDS: usize = 3;

/// Empty responses tolerated before giving up.
pub const MAX_EMPTY_RETRIES: usize = 2;

/// Cap on a single tool result appended to the working set.
pub const MAX_TOOL_RESULT_CHARS: usize = 2_000;

/// Hard wall-clock timeout for one model call. The HTTP-level timeout
/// can be fooled by slow-drip streaming; this one cannot.
pub const LLM_HARD_TIMEOUT_MS: u64 = 50_000;

/// Cap on the summary text merged back into shared state.
pub const SUMMARY_MAX_CHARS: usize = 3_000;

const COMPACT_AFTER_ROUND: usize = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
/// Public struct `ImageAttachment` used across Quill components.
pub struct ImageAttachment {
    pub data_url: String,
}

/// State-derived inputs for one specialist invocation.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub task: String,
    /// Router instruction for this hop; empty means "use the task".
    pub sub_task: String,
    pub file_context: String,
    /// Prior user/assistant exchanges, oldest first, current task last.
    pub history: Vec<Message>,
    pub images: Vec<ImageAttachment>,
}

/// What one invocation hands back for the state merge.
#[derive(Debug, Clone)]
pub struct SpecialistReport {
    pub new_messages: Vec<Message>,
    pub summary: String,
    pub tool_calls_made: u32,
}

#[derive(Debug, Clone)]
/// Public struct `SpecialistConfig` used across Quill components.
pub struct SpecialistConfig {
    pub role_name: String,
    pub system_prompt: String,
    pub model: String,
    /// Ordered fallback candidates for this role's provider.
    pub fallback_candidates: Vec<String>,
    /// Model used instead of `model` when image input is present.
    pub vision_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub max_tool_rounds: usize,
    pub max_empty_retries: usize,
    pub llm_hard_timeout_ms: u64,
}

impl SpecialistConfig {
    pub fn new(role_name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            role_name: role_name.into(),
            system_prompt: system_prompt.into(),
            model: String::new(),
            fallback_candidates: Vec::new(),
            vision_model: None,
            max_tokens: None,
            temperature: None,
            max_tool_rounds: MAX_TOOL_ROUNDS,
            max_empty_retries: MAX_EMPTY_RETRIES,
            llm_hard_timeout_ms: LLM_HARD_TIMEOUT_MS,
        }
    }
}

/// One role's agent: fixed prompt and toolset, shared client and
/// fallback chain.
pub struct SpecialistAgent {
    client: Arc<dyn LlmClient>,
    fallback: Arc<FallbackChain>,
    config: SpecialistConfig,
    tools: Vec<Arc<dyn AgentTool>>,
    cancellation: Option<CooperativeCancellationToken>,
}

impl SpecialistAgent {
    pub fn new(
        client: Arc<dyn LlmClient>,
        fallback: Arc<FallbackChain>,
        config: SpecialistConfig,
    ) -> Self {
        Self {
            client,
            fallback,
            config,
            tools: Vec::new(),
            cancellation: None,
        }
    }

    pub fn register_tool<T>(&mut self, tool: T)
    where
        T: AgentTool + 'static,
    {
        self.tools.push(Arc::new(tool));
    }

    pub fn register_tools(&mut self, tools: Vec<Arc<dyn AgentTool>>) {
        self.tools.extend(tools);
    }

    pub fn set_cancellation_token(&mut self, token: Option<CooperativeCancellationToken>) {
        self.cancellation = token;
    }

    pub fn role_name(&self) -> &str {
        &self.config.role_name
    }

    /// Runs the full loop and returns the delta-worthy report.
    pub async fn run(&self, context: &TurnContext) -> Result<SpecialistReport, AgentError> {
        let role = self.config.role_name.clone();
        let mut model = self.active_model(context);
        let tool_definitions: Vec<_> = self.tools.iter().map(|tool| tool.definition()).collect();
        let tool_names = self.tool_name_list();

        let mut working = vec![
            Message::system(&self.config.system_prompt),
            self.build_task_message(context, &tool_names),
        ];
        let mut new_messages: Vec<Message> = Vec::new();
        let mut tool_calls_made: u32 = 0;
        let mut empty_retries = 0usize;
        let mut fallback_swaps = 0usize;
        // Each swap marks a model failed, so the chain shrinks; the
        // budget stops a pathological reset cycle from spinning.
        let swap_budget = self.config.fallback_candidates.len().saturating_add(1);

        let mut round = 0usize;
        while round < self.config.max_tool_rounds {
            if let Some(token) = &self.cancellation {
                if token.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
            }

            if round >= COMPACT_AFTER_ROUND {
                compact_older_tool_results(&mut working);
            }
            let mut ctx_chars = context_chars(&working);
            if ctx_chars > MAX_TOTAL_CONTEXT_CHARS {
                hard_trim_context(&mut working, MAX_TOTAL_CONTEXT_CHARS);
                ctx_chars = context_chars(&working);
            }

            info!(
                %role,
                round,
                context_chars = ctx_chars,
                messages = working.len(),
                %model,
                "model call"
            );

            let request = ChatRequest {
                model: model.clone(),
                messages: working.clone(),
                tools: tool_definitions.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let hard_timeout = Duration::from_millis(self.config.llm_hard_timeout_ms.max(1));
            let response = match timeout(hard_timeout, self.client.complete(request)).await {
                Err(_elapsed) => {
                    warn!(
                        %role,
                        round,
                        timeout_ms = self.config.llm_hard_timeout_ms,
                        "model hard timeout, trying fallback"
                    );
                    if self.swap_model(&mut model, &mut fallback_swaps, swap_budget) {
                        // Retry this round with the new model; no
                        // round budget charged.
                        continue;
                    }
                    if !new_messages.is_empty() {
                        break;
                    }
                    return Err(AgentError::HardTimeout {
                        role,
                        timeout_ms: self.config.llm_hard_timeout_ms,
                    });
                }
                Ok(Err(ai_error)) => {
                    let rendered = ai_error.to_string();
                    if classify_failure(&rendered) == FailureKind::Recoverable {
                        warn!(
                            %role,
                            round,
                            error = %truncate_chars(&rendered, 150),
                            "recoverable model error, trying fallback"
                        );
                        if self.swap_model(&mut model, &mut fallback_swaps, swap_budget) {
                            continue;
                        }
                    }
                    error!(%role, round, error = %rendered, "model call failed");
                    if !new_messages.is_empty() {
                        break;
                    }
                    return Err(AgentError::Ai(ai_error));
                }
                Ok(Ok(response)) => response,
            };

            let message = response.message;

            if message.is_empty_response() {
                warn!(%role, round, "empty response, nudging");
                empty_retries += 1;
                if empty_retries >= self.config.max_empty_retries {
                    error!(%role, empty_retries, "gave up after empty retries");
                    break;
                }
                working.push(Message::user(format!(
                    "Your response was empty. You MUST call at least one tool to get real data. \
                     Here are your available tools: {tool_names}. Call one now to gather data, \
                     then provide decisive, actionable analysis."
                )));
                round += 1;
                continue;
            }

            let mut calls = message.tool_calls();
            if calls.is_empty() {
                let text = message.text_content();
                let text_calls = parse_text_tool_calls(&text);
                if !text_calls.is_empty() {
                    info!(
                        %role,
                        count = text_calls.len(),
                        "detected text-based tool calls, executing"
                    );
                    calls = text_calls;
                }
            }

            new_messages.push(message.clone());
            working.push(message);

            if calls.is_empty() {
                if round == 0 && tool_calls_made == 0 && !self.tools.is_empty() {
                    warn!(%role, "no tool calls on round 0, forcing retry");
                    working.push(Message::user(format!(
                        "Your response did not call any tools. You MUST call tools to get real \
                         data.\nAvailable tools: {tool_names}\nCall at least one tool NOW using \
                         the function calling mechanism. Do NOT write about calling tools, \
                         actually invoke them."
                    )));
                    round += 1;
                    continue;
                }
                break;
            }

            let tool_map: HashMap<String, Arc<dyn AgentTool>> = self
                .tools
                .iter()
                .map(|tool| (tool.definition().name, Arc::clone(tool)))
                .collect();

            for call in calls {
                info!(%role, tool = %call.name, args = %call.arguments, "calling tool");
                tool_calls_made += 1;
                let result = match tool_map.get(&call.name) {
                    Some(tool) => tool.execute(call.arguments.clone()).await,
                    None => ToolExecutionResult::error(json!({
                        "error": format!("Unknown tool: {}", call.name),
                    })),
                };

                let result_text = truncate_tool_result(&result.as_text(), &call.name);
                let tool_message =
                    Message::tool_result(call.id, call.name, result_text, result.is_error);
                new_messages.push(tool_message.clone());
                working.push(tool_message);
            }

            round += 1;
        }

        if tool_calls_made == 0 && !self.tools.is_empty() {
            warn!(%role, "completed without calling any tools, output may be ungrounded");
        }

        let final_text = new_messages
            .iter()
            .rev()
            .find(|message| {
                message.role == MessageRole::Assistant && !message.text_content().trim().is_empty()
            })
            .map(|message| message.text_content())
            .unwrap_or_default();

        Ok(SpecialistReport {
            new_messages,
            summary: truncate_chars(&final_text, SUMMARY_MAX_CHARS),
            tool_calls_made,
        })
    }

    fn active_model(&self, context: &TurnContext) -> String {
        if !context.images.is_empty() {
            if let Some(vision_model) = &self.config.vision_model {
                info!(role = %self.config.role_name, model = %vision_model, "using vision model");
                return vision_model.clone();
            }
        }
        self.config.model.clone()
    }

    fn tool_name_list(&self) -> String {
        self.tools
            .iter()
            .map(|tool| tool.definition().name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn swap_model(&self, model: &mut String, swaps: &mut usize, budget: usize) -> bool {
        if *swaps >= budget {
            return false;
        }
        *swaps += 1;
        match self
            .fallback
            .next_candidate(&self.config.fallback_candidates, model)
        {
            FallbackDecision::Next(next) => {
                *model = next;
                true
            }
            FallbackDecision::Exhausted => false,
        }
    }

    fn build_task_message(&self, context: &TurnContext, tool_names: &str) -> Message {
        let task_text = if context.sub_task.trim().is_empty() {
            context.task.as_str()
        } else {
            context.sub_task.as_str()
        };

        let file_section = if context.file_context.is_empty() {
            String::new()
        } else {
            format!("\n\n{}\n", context.file_context)
        };

        let conversation_context = conversation_history_section(&context.history);

        let task_prompt = format!(
            "{conversation_context}Task: {task_text}\n\n\
             CRITICAL: You have access to tools. You MUST use them to gather data BEFORE \
             providing analysis.\n\
             Do NOT write about calling tools - ACTUALLY call them using the function calling \
             mechanism.\n\
             Do NOT say 'Tool Call: function_name()' in text - use the structured tool calling \
             API.\n\n\
             Available tools: {tool_names}\n\n\
             After gathering REAL data from tools, provide DECISIVE, ACTION-ORIENTED analysis \
             with specific recommendations. You work for an investment firm that needs \
             execution-ready intelligence, not academic disclaimers. No hedging like 'this would \
             be speculation' - provide your best professional assessment based on the data.\
             {file_section}"
        );

        if context.images.is_empty() {
            return Message::user(task_prompt);
        }

        let mut blocks = vec![
            ContentBlock::Text { text: task_prompt },
            ContentBlock::Text {
                text: "\n\nYou have been provided with image(s). Carefully analyze the visual \
                       content. Extract any text, tables, charts, numbers, or relevant financial \
                       data visible in the image(s). Include the extracted information in your \
                       analysis.\n"
                    .to_string(),
            },
        ];
        for image in &context.images {
            blocks.push(ContentBlock::Image {
                source: MediaSource::Url {
                    url: image.data_url.clone(),
                },
            });
        }
        Message::user_blocks(blocks)
    }
}

/// Builds the prior-conversation section of the task prompt. Included
/// only when more than one prior exchange exists; the newest entry is
/// the current task and is excluded.
fn conversation_history_section(history: &[Message]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for message in history {
        let content = message.text_content();
        if content.trim().is_empty() {
            continue;
        }
        let capped: String = content.chars().take(500).collect();
        match message.role {
            MessageRole::User => parts.push(format!("User: {capped}")),
            MessageRole::Assistant => parts.push(format!("Assistant: {capped}")),
            _ => {}
        }
    }

    if parts.len() <= 1 {
        return String::new();
    }
    parts.pop();

    format!(
        "\n\n--- CONVERSATION HISTORY ---\n\
         The user is in an ongoing conversation. Here is the prior context:\n\n\
         {}\n\
         --- END CONVERSATION HISTORY ---\n\n\
         Use this history to understand the user's intent and maintain consistency with prior \
         analysis and recommendations.\n",
        parts.join("\n\n")
    )
}

/// Caps a single tool result, preserving a note about the cut so the
/// model knows data is missing.
pub fn truncate_tool_result(text: &str, tool_name: &str) -> String {
    let original = text.chars().count();
    if original <= MAX_TOOL_RESULT_CHARS {
        return text.to_string();
    }

    let note = format!("\n... [truncated from {original} to {MAX_TOOL_RESULT_CHARS} chars]");
    let keep = MAX_TOOL_RESULT_CHARS.saturating_sub(note.chars().count());
    let cut: String = text.chars().take(keep).collect();
    debug!(
        tool = tool_name,
        original,
        kept = keep,
        "truncated tool result"
    );
    format!("{cut}{note}")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use quill_ai::{
        AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, FallbackChain, LlmClient,
        Message, ToolDefinition,
    };

    use super::{
        conversation_history_section, truncate_tool_result, SpecialistAgent, SpecialistConfig,
        TurnContext, MAX_TOOL_RESULT_CHARS,
    };
    use crate::{AgentError, AgentTool, ToolExecutionResult};

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

    struct HangingClient;

    #[async_trait]
    impl LlmClient for HangingClient {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, AiError> {
            std::future::pending().await
        }
    }

    struct StubPriceTool;

    #[async_trait]
    impl AgentTool for StubPriceTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "get_stock_price".to_string(),
                description: "Fetch the latest quote".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
            ToolExecutionResult::ok(json!({ "ticker": "AAPL", "price": 150.0 }))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl AgentTool for FailingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "broken_tool".to_string(),
                description: "Always fails".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
            }
        }

        async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
            ToolExecutionResult::error(json!({ "error": "backing service unreachable" }))
        }
    }

    fn ok_response(message: Message) -> Result<ChatResponse, AiError> {
        Ok(ChatResponse {
            message,
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage::default(),
        })
    }

    fn tool_call_message(id: &str, name: &str, arguments: Value) -> Message {
        Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }])
    }

    fn config_with_model(model: &str) -> SpecialistConfig {
        let mut config = SpecialistConfig::new("quant_researcher", "You are a quant researcher.");
        config.model = model.to_string();
        config.fallback_candidates = vec![model.to_string()];
        config
    }

    fn task_context(task: &str) -> TurnContext {
        TurnContext {
            task: task.to_string(),
            ..TurnContext::default()
        }
    }

    #[tokio::test]
    async fn functional_executes_tool_calls_and_summarizes() {
        let client = ScriptedClient::new(vec![
            ok_response(tool_call_message(
                "call-1",
                "get_stock_price",
                json!({ "ticker": "AAPL" }),
            )),
            ok_response(Message::assistant_text(
                "AAPL trades at 150.0; momentum looks constructive.",
            )),
        ]);
        let mut agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );
        agent.register_tool(StubPriceTool);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");

        assert_eq!(report.tool_calls_made, 1);
        assert!(report.summary.contains("150.0"));
        // assistant + tool result + final assistant
        assert_eq!(report.new_messages.len(), 3);
    }

    #[tokio::test]
    async fn functional_forces_tool_retry_when_first_round_skips_tools() {
        let client = ScriptedClient::new(vec![
            ok_response(Message::assistant_text("AAPL looks strong, trust me.")),
            ok_response(tool_call_message(
                "call-1",
                "get_stock_price",
                json!({ "ticker": "AAPL" }),
            )),
            ok_response(Message::assistant_text("Confirmed: AAPL at 150.0.")),
        ]);
        let mut agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );
        agent.register_tool(StubPriceTool);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");

        assert_eq!(report.tool_calls_made, 1);
        assert!(report.summary.contains("Confirmed"));
    }

    #[tokio::test]
    async fn functional_empty_responses_exhaust_retry_budget() {
        let client = ScriptedClient::new(vec![
            ok_response(Message::assistant_text("   ")),
            ok_response(Message::assistant_text("")),
        ]);
        let mut agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );
        agent.register_tool(StubPriceTool);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");

        assert_eq!(report.tool_calls_made, 0);
        assert!(report.summary.is_empty());
        assert!(report.new_messages.is_empty());
    }

    #[tokio::test]
    async fn functional_recoverable_error_swaps_model_without_charging_round() {
        let client = ScriptedClient::new(vec![
            Err(AiError::HttpStatus {
                status: 429,
                body: "rate limit exceeded".to_string(),
            }),
            ok_response(Message::assistant_text("Analysis complete.")),
        ]);
        let mut config = config_with_model("model-a");
        config.fallback_candidates = vec!["model-a".to_string(), "model-b".to_string()];
        let agent = SpecialistAgent::new(client.clone(), Arc::new(FallbackChain::new()), config);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");

        assert_eq!(report.summary, "Analysis complete.");
        assert_eq!(client.models_seen(), vec!["model-a", "model-b"]);
    }

    #[tokio::test]
    async fn functional_fatal_error_with_no_output_propagates() {
        let client = ScriptedClient::new(vec![Err(AiError::HttpStatus {
            status: 401,
            body: "invalid key".to_string(),
        })]);
        let agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );

        let error = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect_err("fatal error");
        assert!(matches!(error, AgentError::Ai(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn functional_hard_timeout_without_fallback_propagates() {
        let agent = SpecialistAgent::new(
            Arc::new(HangingClient),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );

        let error = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect_err("timeout error");
        assert!(matches!(error, AgentError::HardTimeout { .. }));
    }

    #[tokio::test]
    async fn functional_text_embedded_tool_calls_are_executed() {
        let client = ScriptedClient::new(vec![
            ok_response(Message::assistant_text(
                r#"Fetching data: {"name": "get_stock_price", "parameters": {"ticker": "AAPL"}}"#,
            )),
            ok_response(Message::assistant_text("AAPL at 150.0 per the feed.")),
        ]);
        let mut agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );
        agent.register_tool(StubPriceTool);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");
        assert_eq!(report.tool_calls_made, 1);
    }

    #[tokio::test]
    async fn regression_tool_failure_is_isolated_not_fatal() {
        let client = ScriptedClient::new(vec![
            ok_response(tool_call_message("call-1", "broken_tool", json!({}))),
            ok_response(Message::assistant_text(
                "Data source unavailable, proceeding on priors.",
            )),
        ]);
        let mut agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );
        agent.register_tool(FailingTool);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");
        assert_eq!(report.tool_calls_made, 1);
        let tool_message = &report.new_messages[1];
        assert!(tool_message.is_error);
        assert!(tool_message.text_content().contains("unreachable"));
    }

    #[tokio::test]
    async fn regression_unknown_tool_names_produce_error_results() {
        let client = ScriptedClient::new(vec![
            ok_response(tool_call_message("call-1", "nonexistent_tool", json!({}))),
            ok_response(Message::assistant_text("Done.")),
        ]);
        let mut agent = SpecialistAgent::new(
            client.clone(),
            Arc::new(FallbackChain::new()),
            config_with_model("model-a"),
        );
        agent.register_tool(StubPriceTool);

        let report = agent
            .run(&task_context("Analyze AAPL"))
            .await
            .expect("report");
        let tool_message = &report.new_messages[1];
        assert!(tool_message.is_error);
        assert!(tool_message.text_content().contains("Unknown tool"));
    }

    #[test]
    fn unit_tool_result_truncation_notes_the_cut() {
        let long = "y".repeat(5_000);
        let truncated = truncate_tool_result(&long, "get_price_history");
        assert!(truncated.chars().count() <= MAX_TOOL_RESULT_CHARS);
        assert!(truncated.contains("[truncated from 5000 to 2000 chars]"));

        let short = "small".to_string();
        assert_eq!(truncate_tool_result(&short, "get_stock_price"), short);
    }

    #[test]
    fn unit_history_section_requires_prior_exchanges() {
        // Only the current task: no section.
        let single = vec![Message::user("Analyze AAPL")];
        assert!(conversation_history_section(&single).is_empty());

        let several = vec![
            Message::user("What is AAPL doing?"),
            Message::assistant_text("AAPL is up 2% today."),
            Message::user("Now compare with MSFT"),
        ];
        let section = conversation_history_section(&several);
        assert!(section.contains("CONVERSATION HISTORY"));
        assert!(section.contains("AAPL is up 2%"));
        // The current task is excluded from the history rendering.
        assert!(!section.contains("compare with MSFT"));
    }
}
