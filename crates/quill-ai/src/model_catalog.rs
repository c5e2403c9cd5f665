//! Dynamic model catalogue for Fireworks AI plus static chains.
//!
//! Fetches the serverless, tool-capable model list once per process and
//! orders it by a pinned preference list. When the fetch fails or no
//! API key is configured, pinned defaults keep the chain non-empty.

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const FIREWORKS_CATALOG_URL: &str = "https://api.fireworks.ai/v1/accounts/fireworks/models";
const CATALOG_FETCH_TIMEOUT_MS: u64 = 10_000;

pub const FALLBACK_GENERAL_MODEL: &str = "accounts/fireworks/models/glm-5";
pub const FALLBACK_CODER_MODEL: &str = "accounts/fireworks/models/deepseek-v3p1";

/// Ordered fallback chain for Groq; fixed because Groq has no catalogue
/// endpoint worth querying for this short list.
pub const GROQ_FALLBACK_CHAIN: &[&str] = &[
    "llama-3.3-70b-versatile",
    "llama-3.1-70b-versatile",
    "llama-3.1-8b-instant",
    "gemma2-9b-it",
];

// kimi-k2 variants emit malformed tool-call section markers with large
// arguments and mixtral narrates tools instead of calling them, so both
// sit at the bottom of the preference order.
const PREFERRED_GENERAL_MODELS: &[&str] = &[
    "glm-5",
    "glm-4p7",
    "gpt-oss-120b",
    "minimax-m2p5",
    "minimax-m2p1",
    "kimi-k2-instruct-0905",
    "kimi-k2p5",
    "mixtral-8x22b-instruct",
];

const PREFERRED_CODER_MODELS: &[&str] = &["deepseek-v3p2", "deepseek-v3p1", "qwen"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `ModelCategory` values.
pub enum ModelCategory {
    General,
    Coder,
}

impl ModelCategory {
    fn pinned_fallback(self) -> &'static str {
        match self {
            ModelCategory::General => FALLBACK_GENERAL_MODEL,
            ModelCategory::Coder => FALLBACK_CODER_MODEL,
        }
    }
}

#[derive(Debug, Clone)]
struct CatalogLists {
    general: Vec<String>,
    coder: Vec<String>,
}

#[derive(Debug)]
/// Public struct `ModelCatalog` used across Quill components.
pub struct ModelCatalog {
    api_key: Option<String>,
    catalog_url: String,
    cache: OnceCell<CatalogLists>,
}

impl ModelCatalog {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            catalog_url: FIREWORKS_CATALOG_URL.to_string(),
            cache: OnceCell::new(),
        }
    }

    /// Test seam; points the catalogue fetch at a local server.
    pub fn with_catalog_url(mut self, url: impl Into<String>) -> Self {
        self.catalog_url = url.into();
        self
    }

    /// Returns the ordered candidate list for a category. The first
    /// fetch result is cached for the life of the process.
    pub async fn candidates(&self, category: ModelCategory) -> Vec<String> {
        let lists = self
            .cache
            .get_or_init(|| async { self.fetch_lists().await })
            .await;
        match category {
            ModelCategory::General => lists.general.clone(),
            ModelCategory::Coder => lists.coder.clone(),
        }
    }

    async fn fetch_lists(&self) -> CatalogLists {
        let Some(api_key) = self.api_key.as_deref().filter(|key| !key.trim().is_empty()) else {
            warn!("fireworks API key not set, using pinned fallback models");
            return Self::pinned_lists();
        };

        match self.fetch_raw_models(api_key).await {
            Ok(models) => {
                let lists = categorize_models(&models);
                info!(
                    general = %lists.general.iter().take(3).map(|m| short_model_name(m)).collect::<Vec<_>>().join(", "),
                    coder = %lists.coder.iter().take(3).map(|m| short_model_name(m)).collect::<Vec<_>>().join(", "),
                    "loaded fireworks model catalogue"
                );
                lists
            }
            Err(error) => {
                warn!(%error, "failed to fetch fireworks models, using pinned fallbacks");
                Self::pinned_lists()
            }
        }
    }

    async fn fetch_raw_models(&self, api_key: &str) -> Result<Vec<RawModel>, crate::AiError> {
        debug!("fetching available fireworks models");
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(CATALOG_FETCH_TIMEOUT_MS))
            .build()?;
        let response = client
            .get(&self.catalog_url)
            .bearer_auth(api_key)
            .query(&[("pageSize", "200")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(crate::AiError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CatalogResponse = response.json().await?;
        Ok(parsed.models)
    }

    fn pinned_lists() -> CatalogLists {
        CatalogLists {
            general: vec![FALLBACK_GENERAL_MODEL.to_string()],
            coder: vec![FALLBACK_CODER_MODEL.to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "supportsServerless")]
    supports_serverless: bool,
    #[serde(default, rename = "supportsTools")]
    supports_tools: bool,
}

fn categorize_models(models: &[RawModel]) -> CatalogLists {
    let mut general = Vec::new();
    let mut coder = Vec::new();

    for model in models {
        if !model.supports_serverless || !model.supports_tools {
            continue;
        }

        let name = model
            .name
            .strip_prefix("accounts/fireworks/models/")
            .unwrap_or(&model.name)
            .to_string();
        let full_name = format!("accounts/fireworks/models/{name}");
        let lowered = name.to_lowercase();

        if ["coder", "deepseek", "qwen"]
            .iter()
            .any(|keyword| lowered.contains(keyword))
        {
            coder.push((name, full_name));
        } else {
            general.push((name, full_name));
        }
    }

    let general = order_by_preference(general, PREFERRED_GENERAL_MODELS);
    let coder = order_by_preference(coder, PREFERRED_CODER_MODELS);

    CatalogLists {
        general: if general.is_empty() {
            vec![FALLBACK_GENERAL_MODEL.to_string()]
        } else {
            general
        },
        coder: if coder.is_empty() {
            vec![FALLBACK_CODER_MODEL.to_string()]
        } else {
            coder
        },
    }
}

/// Moves preferred models to the front, keeping catalogue order for the
/// rest. Each preference entry claims at most one model.
fn order_by_preference(models: Vec<(String, String)>, preferences: &[&str]) -> Vec<String> {
    let mut ordered = Vec::new();
    let mut remaining = models;

    for preference in preferences {
        let lowered = preference.to_lowercase();
        if let Some(index) = remaining
            .iter()
            .position(|(name, _)| name.to_lowercase().contains(&lowered))
        {
            let (_, full_name) = remaining.remove(index);
            ordered.push(full_name);
        }
    }

    for (_, full_name) in remaining {
        ordered.push(full_name);
    }

    ordered
}

fn short_model_name(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::{
        categorize_models, order_by_preference, ModelCatalog, ModelCategory, RawModel,
        FALLBACK_CODER_MODEL, FALLBACK_GENERAL_MODEL,
    };
    use httpmock::prelude::*;
    use serde_json::json;

    fn raw(name: &str, serverless: bool, tools: bool) -> RawModel {
        RawModel {
            name: format!("accounts/fireworks/models/{name}"),
            supports_serverless: serverless,
            supports_tools: tools,
        }
    }

    #[test]
    fn unit_filters_non_serverless_and_toolless_models() {
        let lists = categorize_models(&[
            raw("glm-5", true, true),
            raw("glm-4p7", false, true),
            raw("gpt-oss-120b", true, false),
        ]);
        assert_eq!(lists.general, vec!["accounts/fireworks/models/glm-5"]);
    }

    #[test]
    fn unit_coder_keywords_route_to_coder_list() {
        let lists = categorize_models(&[
            raw("deepseek-v3p1", true, true),
            raw("qwen3-coder-480b", true, true),
            raw("glm-5", true, true),
        ]);
        assert_eq!(lists.coder.len(), 2);
        assert_eq!(lists.general, vec!["accounts/fireworks/models/glm-5"]);
    }

    #[test]
    fn functional_preference_ordering_puts_preferred_first() {
        let models = vec![
            (
                "mixtral-8x22b-instruct".to_string(),
                "accounts/fireworks/models/mixtral-8x22b-instruct".to_string(),
            ),
            (
                "glm-5".to_string(),
                "accounts/fireworks/models/glm-5".to_string(),
            ),
            (
                "some-new-model".to_string(),
                "accounts/fireworks/models/some-new-model".to_string(),
            ),
        ];
        let ordered = order_by_preference(models, super::PREFERRED_GENERAL_MODELS);
        assert_eq!(ordered[0], "accounts/fireworks/models/glm-5");
        assert_eq!(
            ordered.last().map(String::as_str),
            Some("accounts/fireworks/models/some-new-model")
        );
    }

    #[test]
    fn regression_empty_categories_fall_back_to_pinned_models() {
        let lists = categorize_models(&[]);
        assert_eq!(lists.general, vec![FALLBACK_GENERAL_MODEL]);
        assert_eq!(lists.coder, vec![FALLBACK_CODER_MODEL]);
    }

    #[tokio::test]
    async fn functional_catalog_fetch_parses_and_caches() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/models");
                then.status(200).json_body(json!({
                    "models": [
                        { "name": "accounts/fireworks/models/glm-5",
                          "supportsServerless": true, "supportsTools": true },
                        { "name": "accounts/fireworks/models/deepseek-v3p1",
                          "supportsServerless": true, "supportsTools": true }
                    ]
                }));
            })
            .await;

        let catalog = ModelCatalog::new(Some("test-key".to_string()))
            .with_catalog_url(server.url("/models"));

        let general = catalog.candidates(ModelCategory::General).await;
        assert_eq!(general, vec!["accounts/fireworks/models/glm-5"]);
        let coder = catalog.candidates(ModelCategory::Coder).await;
        assert_eq!(coder, vec!["accounts/fireworks/models/deepseek-v3p1"]);

        // Second category read reuses the cached fetch.
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn regression_missing_api_key_skips_network_entirely() {
        let catalog = ModelCatalog::new(None);
        let general = catalog.candidates(ModelCategory::General).await;
        assert_eq!(general, vec![FALLBACK_GENERAL_MODEL]);
    }
}
