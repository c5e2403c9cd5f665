use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use quill_core::current_unix_timestamp_ms;

use crate::retry::RetryPolicy;
use crate::types::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, MediaSource, Message,
    MessageRole,
};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("quill-{}-{count}", current_unix_timestamp_ms())
}

#[derive(Debug, Clone)]
/// Public struct `OpenAiConfig` used across Quill components.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    /// Provider-specific headers, e.g. OpenRouter attribution headers.
    pub extra_headers: Vec<(String, String)>,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            extra_headers: Vec::new(),
            request_timeout_ms: 120_000,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
/// Public struct `OpenAiClient` used across Quill components.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey(config.api_base.clone()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| AiError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );

        for (name, value) in &config.extra_headers {
            let header_name: reqwest::header::HeaderName = name.parse().map_err(|_| {
                AiError::InvalidResponse(format!("invalid provider header name: {name}"))
            })?;
            headers.insert(
                header_name,
                HeaderValue::from_str(value).map_err(|e| {
                    AiError::InvalidResponse(format!("invalid provider header value: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        let body = build_chat_request_body(&request)?;
        let url = self.chat_completions_url();
        let started = std::time::Instant::now();
        let policy = &self.config.retry;

        for attempt in 0..=policy.max_retries {
            let response = self
                .client
                .post(&url)
                .header("x-quill-request-id", next_request_id())
                .header("x-quill-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().await?;
                        return parse_chat_response(&raw);
                    }

                    let retry_after = RetryPolicy::retry_after(response.headers());
                    let raw = response.text().await?;
                    if attempt < policy.max_retries
                        && RetryPolicy::retryable_status(status.as_u16())
                    {
                        let delay = policy.delay_before(attempt, retry_after);
                        if policy.within_budget(started.elapsed(), delay) {
                            sleep(delay).await;
                            continue;
                        }
                    }

                    return Err(AiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                Err(error) => {
                    if attempt < policy.max_retries
                        && RetryPolicy::retryable_transport_error(&error)
                    {
                        let delay = policy.delay_before(attempt, None);
                        if policy.within_budget(started.elapsed(), delay) {
                            sleep(delay).await;
                            continue;
                        }
                    }
                    return Err(AiError::Http(error));
                }
            }
        }

        Err(AiError::InvalidResponse(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Result<Value, AiError> {
    let messages = to_openai_messages(&request.messages)?;
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect(),
        );
    }

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    Ok(body)
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<Value>, AiError> {
    let mut serialized = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => serialized.push(json!({
                "role": "system",
                "content": flatten_message_with_media_markers(message),
            })),
            MessageRole::User => serialized.push(json!({
                "role": "user",
                "content": to_openai_user_content(message),
            })),
            MessageRole::Assistant => {
                let tool_calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();

                let text = flatten_message_with_media_markers(message);
                let content = if text.trim().is_empty() && !tool_calls.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };

                if tool_calls.is_empty() {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": content,
                    }));
                } else {
                    serialized.push(json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls,
                    }));
                }
            }
            MessageRole::Tool => {
                let Some(tool_call_id) = message.tool_call_id.as_deref() else {
                    return Err(AiError::InvalidResponse(
                        "tool message is missing tool_call_id".to_string(),
                    ));
                };

                let mut tool_message = json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": flatten_message_with_media_markers(message),
                });

                if let Some(name) = &message.tool_name {
                    tool_message["name"] = Value::String(name.clone());
                }

                serialized.push(tool_message);
            }
        }
    }

    Ok(serialized)
}

fn to_openai_user_content(message: &Message) -> Value {
    let has_non_text_block = message
        .content
        .iter()
        .any(|block| !matches!(block, ContentBlock::Text { .. }));
    if !has_non_text_block {
        return Value::String(message.text_content());
    }

    let mut parts = Vec::new();
    for block in &message.content {
        match block {
            ContentBlock::Text { text } => {
                if !text.trim().is_empty() {
                    parts.push(json!({
                        "type": "text",
                        "text": text,
                    }));
                }
            }
            ContentBlock::Image { source } => {
                parts.push(to_openai_image_part(source));
            }
            ContentBlock::ToolCall { .. } => {}
        }
    }

    if parts.is_empty() {
        Value::String(String::new())
    } else {
        Value::Array(parts)
    }
}

fn to_openai_image_part(source: &MediaSource) -> Value {
    match source {
        MediaSource::Url { url } => json!({
            "type": "image_url",
            "image_url": { "url": url },
        }),
        MediaSource::Base64 { mime_type, data } => {
            let data_url = format!("data:{mime_type};base64,{data}");
            json!({
                "type": "image_url",
                "image_url": { "url": data_url },
            })
        }
    }
}

fn flatten_message_with_media_markers(message: &Message) -> String {
    let mut parts = Vec::new();
    for block in &message.content {
        match block {
            ContentBlock::Text { text } => {
                if !text.trim().is_empty() {
                    parts.push(text.clone());
                }
            }
            ContentBlock::ToolCall { .. } => {}
            ContentBlock::Image { source } => {
                parts.push(format!("[quill-image:{}]", media_source_descriptor(source)));
            }
        }
    }
    parts.join("\n")
}

fn media_source_descriptor(source: &MediaSource) -> String {
    match source {
        MediaSource::Url { url } => format!("url:{url}"),
        MediaSource::Base64 { mime_type, data } => {
            format!("base64:{mime_type}:{}bytes", data.len())
        }
    }
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, AiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AiError::InvalidResponse("response contained no choices".to_string()))?;

    let mut content = Vec::new();
    if let Some(Value::String(text)) = &choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::Text { text: text.clone() });
        }
    }

    if let Some(tool_calls) = choice.message.tool_calls {
        for tool_call in tool_calls {
            if tool_call.call_type != "function" {
                continue;
            }

            let arguments = match serde_json::from_str::<Value>(&tool_call.function.arguments) {
                Ok(value) => value,
                Err(_) => Value::String(tool_call.function.arguments),
            };

            content.push(ContentBlock::ToolCall {
                id: tool_call.id,
                name: tool_call.function.name,
                arguments,
            });
        }
    }

    let message = Message {
        role: MessageRole::Assistant,
        content,
        tool_call_id: None,
        tool_name: None,
        is_error: false,
    };

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message,
        finish_reason: choice.finish_reason,
        usage,
    })
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<Value>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::{build_chat_request_body, next_request_id, parse_chat_response, OpenAiClient, OpenAiConfig};
    use crate::retry::RetryPolicy;
    use crate::types::{AiError, ChatRequest, ContentBlock, LlmClient, MediaSource, Message, ToolDefinition};

    fn request_with(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: "qwen/qwen3-32b".to_string(),
            messages,
            tools: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    #[test]
    fn unit_serializes_assistant_tool_calls() {
        let assistant = Message::assistant_blocks(vec![ContentBlock::ToolCall {
            id: "call-1".to_string(),
            name: "get_stock_price".to_string(),
            arguments: json!({ "ticker": "AAPL" }),
        }]);
        let tool_result =
            Message::tool_result("call-1", "get_stock_price", "{\"price\": 150.0}", false);

        let body = build_chat_request_body(&request_with(vec![assistant, tool_result]))
            .expect("request body");
        let messages = body["messages"].as_array().expect("messages array");

        assert_eq!(messages[0]["role"], "assistant");
        assert!(messages[0]["content"].is_null());
        assert_eq!(
            messages[0]["tool_calls"][0]["function"]["name"],
            "get_stock_price"
        );
        assert_eq!(messages[1]["role"], "tool");
        assert_eq!(messages[1]["tool_call_id"], "call-1");
        assert_eq!(messages[1]["name"], "get_stock_price");
    }

    #[test]
    fn unit_serializes_user_multimodal_parts() {
        let user = Message::user_blocks(vec![
            ContentBlock::Text {
                text: "analyze this chart".to_string(),
            },
            ContentBlock::Image {
                source: MediaSource::Base64 {
                    mime_type: "image/png".to_string(),
                    data: "aGVsbG8=".to_string(),
                },
            },
        ]);

        let body = build_chat_request_body(&request_with(vec![user])).expect("request body");
        let parts = body["messages"][0]["content"]
            .as_array()
            .expect("content parts");

        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .expect("data url")
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn functional_tool_definitions_and_limits_land_in_body() {
        let mut request = request_with(vec![Message::user("quote AAPL")]);
        request.tools = vec![ToolDefinition {
            name: "get_stock_price".to_string(),
            description: "Fetch the latest quote".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }];
        request.max_tokens = Some(512);
        request.temperature = Some(0.2);

        let body = build_chat_request_body(&request).expect("request body");
        assert_eq!(body["tools"][0]["function"]["name"], "get_stock_price");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["temperature"], 0.2);
    }

    #[test]
    fn functional_parses_tool_calls_from_response() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-7",
                        "type": "function",
                        "function": {
                            "name": "get_stock_price",
                            "arguments": "{\"ticker\": \"AAPL\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19 }
        })
        .to_string();

        let response = parse_chat_response(&raw).expect("parsed response");
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_stock_price");
        assert_eq!(calls[0].arguments["ticker"], "AAPL");
        assert_eq!(response.usage.total_tokens, 19);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn regression_malformed_tool_arguments_fall_back_to_raw_string() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-8",
                        "type": "function",
                        "function": {
                            "name": "get_stock_price",
                            "arguments": "{not json"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();

        let response = parse_chat_response(&raw).expect("parsed response");
        let calls = response.message.tool_calls();
        assert_eq!(calls[0].arguments, json!("{not json"));
    }

    #[test]
    fn unit_request_ids_are_unique_and_prefixed() {
        let a = next_request_id();
        let b = next_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("quill-"));
    }

    #[tokio::test]
    async fn regression_transient_statuses_consume_the_full_retry_allowance() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let client = OpenAiClient::new(OpenAiConfig {
            api_base: server.url("/v1"),
            api_key: "test-key".to_string(),
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                budget: Duration::ZERO,
                jitter: false,
            },
            ..OpenAiConfig::default()
        })
        .expect("client");

        let error = client
            .complete(ChatRequest {
                model: "qwen/qwen3-32b".to_string(),
                messages: vec![Message::user("quote AAPL")],
                tools: Vec::new(),
                max_tokens: None,
                temperature: None,
            })
            .await
            .expect_err("exhausted retries");

        assert!(matches!(error, AiError::HttpStatus { status: 503, .. }));
        // Initial attempt plus both retries.
        mock.assert_hits_async(3).await;
    }
}
