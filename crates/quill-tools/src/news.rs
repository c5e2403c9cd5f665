//! News, macro, and sentiment tools over free public endpoints:
//! Google News RSS, the FRED observations API, and the alternative.me
//! Fear & Greed feed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use quill_agent_core::{AgentTool, ToolExecutionResult};
use quill_ai::ToolDefinition;
use quill_core::current_unix_timestamp;

const DEFAULT_NEWS_BASE_URL: &str = "https://news.google.com";
const DEFAULT_FRED_BASE_URL: &str = "https://api.stlouisfed.org";
const DEFAULT_SENTIMENT_BASE_URL: &str = "https://api.alternative.me";
const REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_ARTICLES: usize = 15;
const DEFAULT_ARTICLES: usize = 8;

/// Curated category feeds, expressed as Google News search queries.
const CATEGORY_QUERIES: &[(&str, &str)] = &[
    ("reuters_markets", "reuters markets"),
    ("bloomberg_markets", "bloomberg markets"),
    ("yahoo_finance", "yahoo finance markets"),
    ("macro_economy", "macroeconomy federal reserve"),
];

/// Enumerates supported `NewsError` values.
#[derive(Debug, Error)]
pub enum NewsError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("feed parse error: {0}")]
    Feed(#[from] rss::Error),
    #[error("FRED_API_KEY not set; get a free key at https://fred.stlouisfed.org")]
    MissingFredKey,
}

/// Public struct `NewsClient` used across Quill components.
pub struct NewsClient {
    http: reqwest::Client,
    news_base_url: String,
    fred_base_url: String,
    sentiment_base_url: String,
    fred_api_key: Option<String>,
}

impl NewsClient {
    pub fn new(fred_api_key: Option<String>) -> Result<Self, NewsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            news_base_url: DEFAULT_NEWS_BASE_URL.to_string(),
            fred_base_url: DEFAULT_FRED_BASE_URL.to_string(),
            sentiment_base_url: DEFAULT_SENTIMENT_BASE_URL.to_string(),
            fred_api_key,
        })
    }

    /// Test seam: redirect every endpoint to one mock server.
    pub fn with_base_urls(
        base_url: impl Into<String>,
        fred_api_key: Option<String>,
    ) -> Result<Self, NewsError> {
        let base = base_url.into().trim_end_matches('/').to_string();
        let mut client = Self::new(fred_api_key)?;
        client.news_base_url = base.clone();
        client.fred_base_url = base.clone();
        client.sentiment_base_url = base;
        Ok(client)
    }

    async fn articles(&self, query: &str, limit: usize) -> Result<Vec<Value>, NewsError> {
        let url = format!(
            "{}/rss/search?q={}&hl=en-US&gl=US&ceid=US:en",
            self.news_base_url,
            query.replace(' ', "+")
        );
        debug!(%query, "fetching news feed");
        let bytes = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let channel = rss::Channel::read_from(&bytes[..])?;
        Ok(channel
            .items()
            .iter()
            .take(limit)
            .map(|item| {
                json!({
                    "title": item.title().unwrap_or_default(),
                    "link": item.link().unwrap_or_default(),
                    "published": item.pub_date().unwrap_or_default(),
                    "source": item
                        .source()
                        .and_then(|s| s.title())
                        .unwrap_or("Unknown"),
                })
            })
            .collect())
    }

    async fn fred_observations(&self, series_id: &str, limit: usize) -> Result<Value, NewsError> {
        let api_key = self
            .fred_api_key
            .as_deref()
            .ok_or(NewsError::MissingFredKey)?;
        let url = format!(
            "{}/fred/series/observations?series_id={series_id}&api_key={api_key}\
             &file_type=json&sort_order=desc&limit={limit}",
            self.fred_base_url
        );
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let observations: Vec<Value> = body
            .get("observations")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|obs| obs.get("value").and_then(Value::as_str) != Some("."))
                    .map(|obs| {
                        json!({
                            "date": obs.get("date").cloned().unwrap_or_default(),
                            "value": obs.get("value").cloned().unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({
            "series_id": series_id,
            "count": observations.len(),
            "observations": observations,
        }))
    }

    async fn fear_greed(&self) -> Result<Value, NewsError> {
        let url = format!("{}/fng/?limit=1", self.sentiment_base_url);
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let record = body
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned()
            .unwrap_or_else(|| json!({}));
        let value = record
            .get("value")
            .and_then(Value::as_str)
            .and_then(|v| v.parse::<i64>().ok())
            .or_else(|| record.get("value").and_then(Value::as_i64))
            .unwrap_or(0);
        Ok(json!({
            "value": value,
            "classification": record
                .get("value_classification")
                .and_then(Value::as_str)
                .unwrap_or("N/A"),
            "timestamp": record.get("timestamp").cloned().unwrap_or_default(),
        }))
    }
}

fn error_result(message: impl std::fmt::Display) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({ "error": message.to_string() }))
}

/// Free-text news search.
pub struct FetchFinancialNewsTool {
    news: Arc<NewsClient>,
}

impl FetchFinancialNewsTool {
    pub fn new(news: Arc<NewsClient>) -> Self {
        Self { news }
    }
}

#[async_trait]
impl AgentTool for FetchFinancialNewsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_financial_news".to_string(),
            description: "Fetch recent financial news articles for a search query via news RSS."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query, e.g. \"AAPL earnings\" or \"Fed interest rates\""
                    },
                    "max_articles": {
                        "type": "integer",
                        "description": "Maximum articles to return, default 8, max 15"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or("stock market");
        let limit = arguments
            .get("max_articles")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).min(MAX_ARTICLES))
            .unwrap_or(DEFAULT_ARTICLES);
        match self.news.articles(query, limit).await {
            Ok(articles) => ToolExecutionResult::ok(json!({
                "query": query,
                "count": articles.len(),
                "articles": articles,
                "fetched_at": current_unix_timestamp(),
            })),
            Err(error) => error_result(error),
        }
    }
}

/// Curated category feeds.
pub struct FetchMarketNewsByCategoryTool {
    news: Arc<NewsClient>,
}

impl FetchMarketNewsByCategoryTool {
    pub fn new(news: Arc<NewsClient>) -> Self {
        Self { news }
    }
}

#[async_trait]
impl AgentTool for FetchMarketNewsByCategoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_market_news_by_category".to_string(),
            description: "Fetch news from predefined financial categories: reuters_markets, \
                          bloomberg_markets, yahoo_finance, macro_economy."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "category": { "type": "string" }
                },
                "required": ["category"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let category = arguments
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("reuters_markets");
        let Some((_, query)) = CATEGORY_QUERIES
            .iter()
            .find(|(name, _)| *name == category)
        else {
            return ToolExecutionResult::error(json!({
                "error": format!("unknown category '{category}'"),
                "available": CATEGORY_QUERIES.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            }));
        };
        match self.news.articles(query, 10).await {
            Ok(articles) => ToolExecutionResult::ok(json!({
                "category": category,
                "count": articles.len(),
                "articles": articles,
            })),
            Err(error) => error_result(error),
        }
    }
}

/// FRED macro series lookup.
pub struct FetchFredSeriesTool {
    news: Arc<NewsClient>,
}

impl FetchFredSeriesTool {
    pub fn new(news: Arc<NewsClient>) -> Self {
        Self { news }
    }
}

#[async_trait]
impl AgentTool for FetchFredSeriesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_fred_series".to_string(),
            description: "Fetch economic data from the FRED API. Common series: DGS10 (10-year \
                          treasury), UNRATE (unemployment), CPIAUCSL (CPI), FEDFUNDS (fed funds \
                          rate), GDP."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "series_id": { "type": "string", "description": "FRED series id, default DGS10" },
                    "limit": { "type": "integer", "description": "Most recent observations, default 30" }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let series_id = arguments
            .get("series_id")
            .and_then(Value::as_str)
            .unwrap_or("DGS10");
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(30);
        match self.news.fred_observations(series_id, limit).await {
            Ok(body) => ToolExecutionResult::ok(body),
            Err(error) => error_result(error),
        }
    }
}

/// Current Fear & Greed sentiment reading.
pub struct FetchFearGreedIndexTool {
    news: Arc<NewsClient>,
}

impl FetchFearGreedIndexTool {
    pub fn new(news: Arc<NewsClient>) -> Self {
        Self { news }
    }
}

#[async_trait]
impl AgentTool for FetchFearGreedIndexTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_fear_greed_index".to_string(),
            description: "Fetch the current market Fear & Greed index value and classification."
                .to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        match self.news.fear_greed().await {
            Ok(body) => ToolExecutionResult::ok(body),
            Err(error) => error_result(error),
        }
    }
}
