//! Provider-agnostic LLM client layer for Quill.
//!
//! Wire types, the `LlmClient` trait, an OpenAI-compatible HTTP client,
//! retry/backoff helpers, the static provider catalogue, the dynamic
//! model catalogue, and the session-wide model fallback chain.

mod fallback;
mod model_catalog;
mod openai;
mod providers;
mod retry;
mod types;

pub use fallback::{FallbackChain, FallbackDecision};
pub use model_catalog::{ModelCatalog, ModelCategory, GROQ_FALLBACK_CHAIN};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use providers::{model_for_role, provider, provider_names, ProviderConfig};
pub use retry::RetryPolicy;
pub use types::{
    AiError, ChatRequest, ChatResponse, ChatUsage, ContentBlock, LlmClient, MediaSource, Message,
    MessageRole, ToolCall, ToolDefinition,
};
