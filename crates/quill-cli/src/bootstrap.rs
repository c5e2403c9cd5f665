//! Wires the provider client, fallback chain, tools, and role agents
//! into a ready-to-run orchestrator.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use quill_agent_core::{SpecialistAgent, SpecialistConfig};
use quill_ai::{
    provider, provider_names, FallbackChain, LlmClient, ModelCatalog, ModelCategory, OpenAiClient,
    OpenAiConfig, ProviderConfig, GROQ_FALLBACK_CHAIN,
};
use quill_orchestrator::{profile, AgentRole, Orchestrator, ProjectManagerTurn, SPECIALIST_ROLES};
use quill_tools::{MarketDataClient, NewsClient};

use crate::cli_args::Cli;

/// Groq's multimodal model, used when image input is present.
const GROQ_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

pub async fn build_orchestrator(cli: &Cli) -> Result<Orchestrator> {
    let Some(provider_config) = provider(&cli.provider) else {
        bail!(
            "unknown provider '{}'; available: {}",
            cli.provider,
            provider_names().join(", ")
        );
    };
    let api_key = std::env::var(provider_config.api_key_env)
        .with_context(|| format!("{} is not set", provider_config.api_key_env))?;

    let client: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(OpenAiConfig {
        api_base: provider_config.base_url.to_string(),
        api_key,
        extra_headers: provider_config
            .extra_headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        ..OpenAiConfig::default()
    })?);
    let fallback = Arc::new(FallbackChain::new());

    let market = Arc::new(MarketDataClient::new().context("building market data client")?);
    let news = Arc::new(
        NewsClient::new(std::env::var("FRED_API_KEY").ok()).context("building news client")?,
    );

    let manager_role = profile(AgentRole::ProjectManager);
    let mut orchestrator = Orchestrator::new(ProjectManagerTurn::new(
        client.clone(),
        manager_role.system_prompt,
        role_model(cli, provider_config, AgentRole::ProjectManager),
    ));

    for role in SPECIALIST_ROLES {
        let role_profile = profile(*role);
        let mut config = SpecialistConfig::new(role.as_str(), role_profile.system_prompt);
        config.model = role_model(cli, provider_config, *role);
        config.fallback_candidates =
            fallback_candidates(cli, provider_config, role_profile.uses_coder_model).await;
        if provider_config.name == "groq" {
            config.vision_model = Some(GROQ_VISION_MODEL.to_string());
        }

        let mut agent = SpecialistAgent::new(client.clone(), fallback.clone(), config);
        agent.register_tools(tools_for_role(*role, &market, &news));
        orchestrator.register_specialist(*role, Arc::new(agent));
    }
    Ok(orchestrator)
}

fn role_model(cli: &Cli, provider_config: &ProviderConfig, role: AgentRole) -> String {
    if let Some(model) = &cli.model {
        return model.clone();
    }
    quill_ai::model_for_role(role.as_str(), provider_config.name)
        .unwrap_or_else(|| provider_config.default_model.to_string())
}

/// Ordered substitution candidates for recoverable model failures.
async fn fallback_candidates(
    cli: &Cli,
    provider_config: &ProviderConfig,
    uses_coder_model: bool,
) -> Vec<String> {
    match provider_config.name {
        "groq" => GROQ_FALLBACK_CHAIN
            .iter()
            .map(|model| model.to_string())
            .collect(),
        "fireworks" => {
            let catalog = ModelCatalog::new(std::env::var(provider_config.api_key_env).ok());
            let category = if uses_coder_model {
                ModelCategory::Coder
            } else {
                ModelCategory::General
            };
            catalog.candidates(category).await
        }
        _ => cli.model.iter().cloned().collect(),
    }
}

fn tools_for_role(
    role: AgentRole,
    market: &Arc<MarketDataClient>,
    news: &Arc<NewsClient>,
) -> Vec<Arc<dyn quill_agent_core::AgentTool>> {
    match role {
        AgentRole::QuantResearcher | AgentRole::PortfolioAnalyst => {
            let mut tools = quill_tools::financial_tools(market.clone());
            tools.extend(quill_tools::computation_tools());
            tools.extend(quill_tools::factor_tools(market.clone()));
            tools
        }
        AgentRole::ResearchIntelligence => {
            let mut tools = quill_tools::news_tools(news.clone());
            tools.extend(quill_tools::financial_tools(market.clone()));
            tools
        }
        AgentRole::SoftwareDeveloper => {
            let mut tools = quill_tools::developer_tools();
            tools.extend(quill_tools::factor_tools(market.clone()));
            tools
        }
        // The manager never runs a tool loop.
        AgentRole::ProjectManager => Vec::new(),
    }
}
