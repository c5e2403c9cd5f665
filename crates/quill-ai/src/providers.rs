//! Static catalogue of OpenAI-compatible inference providers.
//!
//! Every provider speaks the chat completions wire format, so switching
//! backends is a config change rather than a code change.

#[derive(Debug, Clone)]
/// Public struct `ProviderConfig` used across Quill components.
pub struct ProviderConfig {
    pub name: &'static str,
    pub base_url: &'static str,
    pub api_key_env: &'static str,
    pub default_model: &'static str,
    pub supports_tool_use: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

const PROVIDERS: &[(&str, ProviderConfig)] = &[
    (
        "together",
        ProviderConfig {
            name: "Together AI",
            base_url: "https://api.together.xyz/v1",
            api_key_env: "TOGETHER_API_KEY",
            default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            supports_tool_use: true,
            extra_headers: &[],
        },
    ),
    (
        "groq",
        ProviderConfig {
            name: "Groq",
            base_url: "https://api.groq.com/openai/v1",
            api_key_env: "GROQ_API_KEY",
            default_model: "llama-3.3-70b-versatile",
            supports_tool_use: true,
            extra_headers: &[],
        },
    ),
    (
        "fireworks",
        ProviderConfig {
            name: "Fireworks AI",
            base_url: "https://api.fireworks.ai/inference/v1",
            api_key_env: "FIREWORKS_API_KEY",
            default_model: "accounts/fireworks/models/deepseek-v3-0324",
            supports_tool_use: true,
            extra_headers: &[],
        },
    ),
    (
        "openrouter",
        ProviderConfig {
            name: "OpenRouter",
            base_url: "https://openrouter.ai/api/v1",
            api_key_env: "OPENROUTER_API_KEY",
            default_model: "meta-llama/llama-3.3-70b-instruct",
            supports_tool_use: true,
            extra_headers: &[("HTTP-Referer", "https://quill-research.local")],
        },
    ),
];

/// Role-specific model overrides; absent pairs fall back to the
/// provider default.
const ROLE_MODEL_OVERRIDES: &[(&str, &[(&str, &str)])] = &[
    (
        "quant_researcher",
        &[
            ("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
            ("groq", "llama-3.3-70b-versatile"),
        ],
    ),
    (
        "portfolio_analyst",
        &[
            ("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
            ("groq", "llama-3.3-70b-versatile"),
        ],
    ),
    (
        "software_developer",
        &[
            ("together", "Qwen/Qwen2.5-Coder-32B-Instruct"),
            ("groq", "qwen-2.5-coder-32b"),
            ("fireworks", "accounts/fireworks/models/deepseek-v3-0324"),
            ("openrouter", "qwen/qwen-2.5-coder-32b-instruct"),
        ],
    ),
    (
        "project_manager",
        &[
            ("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
            ("groq", "llama-3.3-70b-versatile"),
        ],
    ),
    (
        "research_intelligence",
        &[
            ("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo"),
            ("groq", "llama-3.3-70b-versatile"),
        ],
    ),
];

pub fn provider(key: &str) -> Option<&'static ProviderConfig> {
    PROVIDERS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, config)| config)
}

pub fn provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|(name, _)| *name).collect()
}

/// Returns the preferred model id for a role on a provider.
pub fn model_for_role(role: &str, provider_key: &str) -> Option<String> {
    let override_model = ROLE_MODEL_OVERRIDES
        .iter()
        .find(|(candidate, _)| *candidate == role)
        .and_then(|(_, table)| {
            table
                .iter()
                .find(|(name, _)| *name == provider_key)
                .map(|(_, model)| *model)
        });

    if let Some(model) = override_model {
        return Some(model.to_string());
    }

    provider(provider_key).map(|config| config.default_model.to_string())
}
