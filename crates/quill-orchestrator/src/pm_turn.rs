//! The project-manager hop: a toolless single-shot completion that
//! produces the routing decision and, on termination, the final
//! synthesis.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use quill_agent_core::{AgentError, SUMMARY_MAX_CHARS};
use quill_ai::{ChatRequest, LlmClient, Message, MessageRole};
use quill_core::truncate_chars;

use crate::routing::extract_sub_task;
use crate::state::{AgentRole, AgentState, StateDelta, TaskResult, TaskStatus, CORE_SPECIALISTS};

/// Per-report cap inside the manager's prompt.
const REPORT_PROMPT_CHARS: usize = 2_000;
/// Per-message cap for replayed conversation history.
const HISTORY_PROMPT_CHARS: usize = 2_500;

/// Public struct `ProjectManagerTurn` used across Quill components.
pub struct ProjectManagerTurn {
    client: Arc<dyn LlmClient>,
    system_prompt: String,
    model: String,
    timeout_ms: u64,
}

impl ProjectManagerTurn {
    pub fn new(
        client: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            model: model.into(),
            timeout_ms: quill_agent_core::LLM_HARD_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Runs one manager hop against the current state. A hung model
    /// fails closed into a termination decision rather than wedging
    /// the loop.
    pub async fn run(&self, state: &AgentState) -> Result<StateDelta, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.system_prompt.clone()),
                Message::user(build_manager_prompt(state)),
            ],
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        };

        let response_text =
            match tokio::time::timeout(Duration::from_millis(self.timeout_ms), async {
                self.client.complete(request).await
            })
            .await
            {
                Ok(Ok(response)) => response.message.text_content(),
                Ok(Err(error)) => return Err(AgentError::Ai(error)),
                Err(_) => {
                    let seconds = self.timeout_ms / 1_000;
                    warn!(
                        timeout_ms = self.timeout_ms,
                        "manager completion hard timeout, failing closed to termination"
                    );
                    json!({
                        "next_agent": "__end__",
                        "reasoning": format!("LLM call timed out after {seconds} seconds"),
                        "sub_task": "I apologize, but the analysis timed out. Please try again \
                                     with a simpler question or fewer tickers.",
                    })
                    .to_string()
                }
            };

        let sub_task = extract_sub_task(&response_text);
        Ok(StateDelta {
            messages: vec![Message::assistant_text(response_text.clone())],
            current_agent: Some(AgentRole::ProjectManager),
            sub_task: Some(sub_task),
            results: vec![TaskResult {
                agent: AgentRole::ProjectManager,
                summary: truncate_chars(&response_text, SUMMARY_MAX_CHARS),
                tool_calls_made: 0,
                status: TaskStatus::Completed,
            }],
            ..StateDelta::default()
        })
    }
}

/// Assembles the manager's user prompt: conversation history, the
/// original task, attached file context, specialist reports, and an
/// iteration-aware routing hint.
fn build_manager_prompt(state: &AgentState) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(history) = conversation_history_section(state) {
        parts.push(history);
    }

    parts.push(format!("Original user task: {}", state.task));

    if !state.file_context.is_empty() {
        parts.push(format!("\n{}\n", state.file_context));
    }

    if state.agent_outputs.is_empty() {
        parts.push(
            "\nNo specialists have reported yet. Route to the first specialist to gather data. \
             Remember: you CANNOT look up data yourself. Delegate to a specialist."
                .to_string(),
        );
        return parts.join("\n");
    }

    parts.push("\n--- SPECIALIST REPORTS SO FAR ---".to_string());
    for (role, output) in &state.agent_outputs {
        parts.push(format!(
            "\n[{role}]:\n{}",
            truncate_chars(output, REPORT_PROMPT_CHARS)
        ));
    }
    parts.push("\n--- END SPECIALIST REPORTS ---".to_string());

    let reported: Vec<&str> = state.agent_outputs.keys().map(AgentRole::as_str).collect();
    let core_done = CORE_SPECIALISTS
        .iter()
        .all(|core| state.agent_outputs.contains_key(core));
    if core_done {
        parts.push(format!(
            "\nIteration {}. ALL CORE SPECIALISTS HAVE REPORTED: {reported:?}. \
             You have enough data to provide a comprehensive synthesis. \
             Route to __end__ NOW and put your COMPLETE FINAL SYNTHESIS in the sub_task field. \
             Do NOT re-route to specialists that have already reported.",
            state.iteration
        ));
    } else {
        parts.push(format!(
            "\nIteration {}. Agents that have reported: {reported:?}. \
             Decide: route to another specialist for more data, or __end__ to synthesize.",
            state.iteration
        ));
    }

    parts.join("\n")
}

/// Prior user/assistant exchanges, present only when there is more
/// than the current task message. The newest message is excluded; it
/// is already surfaced as the task line.
fn conversation_history_section(state: &AgentState) -> Option<String> {
    let mut history: Vec<String> = Vec::new();
    for message in &state.messages {
        let text = message.text_content();
        if text.trim().is_empty() {
            continue;
        }
        let speaker = match message.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
            _ => continue,
        };
        history.push(format!(
            "{speaker}: {}",
            truncate_chars(&text, HISTORY_PROMPT_CHARS)
        ));
    }
    if history.len() < 2 {
        return None;
    }
    history.pop();
    Some(format!(
        "--- CONVERSATION HISTORY ---\n\
         The user is in an ongoing conversation. Here is the prior context:\n\n\
         {}\n\
         --- END CONVERSATION HISTORY ---\n\n\
         IMPORTANT: Use this history to understand the user's intent.\n\
         - When the user says 'this stock', 'that', 'it', etc., they refer to topics above.\n\
         - When the user says 'other stocks', 'the rest', 'remaining', 'what about X', \
         identify WHICH SPECIFIC items were NOT yet covered in the conversation and \
         ONLY analyze those. Do NOT re-analyze items already covered above.\n\
         - Read the prior assistant response carefully to see what was already analyzed.\n\
         - Maintain consistency with prior analysis and recommendations.",
        history.join("\n\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::{build_manager_prompt, conversation_history_section, ProjectManagerTurn};
    use crate::state::{AgentRole, AgentState, TaskStatus};
    use async_trait::async_trait;
    use quill_ai::{AiError, ChatRequest, ChatResponse, ChatUsage, LlmClient, Message};
    use std::sync::{Arc, Mutex};

    struct ScriptedClient {
        responses: Mutex<Vec<Result<ChatResponse, AiError>>>,
        last_prompt: Mutex<String>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<ChatResponse, AiError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                last_prompt: Mutex::new(String::new()),
            }
        }

        fn text(text: &str) -> Result<ChatResponse, AiError> {
            Ok(ChatResponse {
                message: Message::assistant_text(text),
                finish_reason: Some("stop".to_string()),
                usage: ChatUsage::default(),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
            *self.last_prompt.lock().expect("prompt lock") = request
                .messages
                .last()
                .map(|m| m.text_content())
                .unwrap_or_default();
            self.responses
                .lock()
                .expect("responses lock")
                .remove(0)
        }
    }

    struct HangingClient;

    #[async_trait]
    impl LlmClient for HangingClient {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, AiError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn functional_manager_turn_extracts_sub_task_and_records_result() {
        let client = Arc::new(ScriptedClient::new(vec![ScriptedClient::text(
            "{\"next_agent\": \"quant_researcher\", \"reasoning\": \"need price\", \
             \"sub_task\": \"Get the current stock price for AAPL using get_stock_price.\"}",
        )]));
        let turn = ProjectManagerTurn::new(client.clone(), "route things", "model-a");
        let state = AgentState::new_task("Analyze AAPL", 15);

        let delta = turn.run(&state).await.expect("manager turn");

        assert_eq!(delta.messages.len(), 1);
        assert_eq!(
            delta.sub_task.as_deref(),
            Some("Get the current stock price for AAPL using get_stock_price.")
        );
        assert_eq!(delta.results.len(), 1);
        assert_eq!(delta.results[0].agent, AgentRole::ProjectManager);
        assert_eq!(delta.results[0].tool_calls_made, 0);
        assert_eq!(delta.results[0].status, TaskStatus::Completed);

        let prompt = client.last_prompt.lock().expect("prompt lock").clone();
        assert!(prompt.contains("Original user task: Analyze AAPL"));
        assert!(prompt.contains("No specialists have reported yet"));
    }

    #[tokio::test(start_paused = true)]
    async fn regression_manager_timeout_fails_closed_to_termination() {
        let turn = ProjectManagerTurn::new(Arc::new(HangingClient), "route things", "model-a")
            .with_timeout_ms(1_000);
        let state = AgentState::new_task("Analyze AAPL", 15);

        let delta = turn.run(&state).await.expect("fail-closed turn");

        let text = delta.messages[0].text_content();
        assert!(text.contains("\"next_agent\":\"__end__\""));
        assert!(text.contains("timed out after 1 seconds"));
        // The apology is long enough to survive the sub-task extractor.
        let sub_task = delta.sub_task.expect("sub_task set");
        assert!(sub_task.contains("analysis timed out"));
    }

    #[test]
    fn unit_prompt_switches_hint_when_core_coverage_is_reached() {
        let mut state = AgentState::new_task("Analyze AAPL", 15);
        state.iteration = 5;
        for role in [
            AgentRole::ResearchIntelligence,
            AgentRole::QuantResearcher,
            AgentRole::PortfolioAnalyst,
        ] {
            state.agent_outputs.insert(role, "reported".to_string());
        }

        let prompt = build_manager_prompt(&state);
        assert!(prompt.contains("ALL CORE SPECIALISTS HAVE REPORTED"));
        assert!(prompt.contains("Iteration 5."));
        assert!(prompt.contains("[quant_researcher]:"));
    }

    #[test]
    fn unit_history_section_omits_the_current_task_message() {
        let state = AgentState::new_task("What about MSFT?", 15).with_prior_history(vec![
            Message::user("Analyze AAPL"),
            Message::assistant_text("AAPL looks strong at 150.0."),
        ]);

        let section = conversation_history_section(&state).expect("history present");
        assert!(section.contains("User: Analyze AAPL"));
        assert!(section.contains("Assistant: AAPL looks strong"));
        assert!(!section.contains("What about MSFT?"));

        let fresh = AgentState::new_task("Analyze AAPL", 15);
        assert!(conversation_history_section(&fresh).is_none());
    }
}
