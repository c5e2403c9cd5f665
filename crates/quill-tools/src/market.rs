//! Market data retrieval over the Yahoo-style chart endpoint.
//!
//! One HTTP client, one endpoint shape. Tools wrap the client and
//! always answer with a JSON payload; upstream failures become
//! `{"error": ...}` results so a bad ticker never kills an agent turn.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use quill_agent_core::{AgentTool, ToolExecutionResult};
use quill_ai::ToolDefinition;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const REQUEST_TIMEOUT_SECS: u64 = 15;
/// History output is capped so tool results stay within budget.
const MAX_HISTORY_RECORDS: usize = 60;
/// Batch quote lookups are capped per call.
const MAX_BATCH_TICKERS: usize = 10;

/// Enumerates supported `MarketError` values.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("no data found for {0}")]
    NoData(String),
    #[error("chart endpoint error: {0}")]
    Upstream(String),
}

/// One OHLCV bar.
#[derive(Debug, Clone)]
pub struct Bar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Parsed chart response for one ticker.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    pub ticker: String,
    pub name: Option<String>,
    pub bars: Vec<Bar>,
}

impl PriceHistory {
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    pub fn latest(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn previous_close(&self) -> Option<f64> {
        if self.bars.len() < 2 {
            return None;
        }
        Some(self.bars[self.bars.len() - 2].close)
    }
}

/// Public struct `MarketDataClient` used across Quill components.
pub struct MarketDataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MarketDataClient {
    pub fn new() -> Result<Self, MarketError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Test seam: point the client at a mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetches OHLCV history for `ticker` over `range` at `interval`.
    pub async fn history(
        &self,
        ticker: &str,
        range: &str,
        interval: &str,
    ) -> Result<PriceHistory, MarketError> {
        let ticker = ticker.trim().to_uppercase();
        let url = format!(
            "{}/v8/finance/chart/{ticker}?range={range}&interval={interval}",
            self.base_url
        );
        debug!(%ticker, %range, %interval, "fetching chart data");
        let response = self.http.get(&url).send().await?.error_for_status()?;
        let envelope: ChartEnvelope = response.json().await?;

        if let Some(error) = envelope.chart.error {
            return Err(MarketError::Upstream(error.description));
        }
        let result = envelope
            .chart
            .result
            .and_then(|mut results| {
                if results.is_empty() {
                    None
                } else {
                    Some(results.remove(0))
                }
            })
            .ok_or_else(|| MarketError::NoData(ticker.clone()))?;
        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| MarketError::NoData(ticker.clone()))?;

        let mut bars = Vec::new();
        for (index, timestamp) in result.timestamp.iter().enumerate() {
            // Null entries appear for halted sessions; skip the bar.
            let (Some(open), Some(high), Some(low), Some(close)) = (
                quote.open.get(index).copied().flatten(),
                quote.high.get(index).copied().flatten(),
                quote.low.get(index).copied().flatten(),
                quote.close.get(index).copied().flatten(),
            ) else {
                continue;
            };
            let volume = quote
                .volume
                .get(index)
                .copied()
                .flatten()
                .unwrap_or_default();
            let date = DateTime::from_timestamp(*timestamp, 0)
                .map(|dt| dt.date_naive().to_string())
                .unwrap_or_else(|| timestamp.to_string());
            bars.push(Bar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        if bars.is_empty() {
            return Err(MarketError::NoData(ticker));
        }
        Ok(PriceHistory {
            ticker,
            name: result.meta.short_name,
            bars,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "shortName")]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize, Default)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn error_result(message: impl std::fmt::Display) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({ "error": message.to_string() }))
}

/// Current price and session context for one ticker.
pub struct GetStockPriceTool {
    market: Arc<MarketDataClient>,
}

impl GetStockPriceTool {
    pub fn new(market: Arc<MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl AgentTool for GetStockPriceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_stock_price".to_string(),
            description: "Get the current / latest stock price and basic session data for a \
                          ticker symbol."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "ticker": {
                        "type": "string",
                        "description": "Stock ticker symbol, e.g. \"AAPL\""
                    }
                },
                "required": ["ticker"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(ticker) = arguments.get("ticker").and_then(Value::as_str) else {
            return error_result("missing 'ticker' argument");
        };
        let history = match self.market.history(ticker, "5d", "1d").await {
            Ok(history) => history,
            Err(error) => return error_result(error),
        };
        let Some(latest) = history.latest() else {
            return error_result(format!("no data found for {ticker}"));
        };
        let change_pct = history
            .previous_close()
            .filter(|prev| *prev != 0.0)
            .map(|prev| round2((latest.close / prev - 1.0) * 100.0));
        ToolExecutionResult::ok(json!({
            "ticker": history.ticker,
            "name": history.name,
            "current_price": round2(latest.close),
            "previous_close": history.previous_close().map(round2),
            "change_pct": change_pct,
            "volume": latest.volume,
            "as_of": latest.date,
        }))
    }
}

/// OHLCV history for one ticker.
pub struct GetHistoricalPricesTool {
    market: Arc<MarketDataClient>,
}

impl GetHistoricalPricesTool {
    pub fn new(market: Arc<MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl AgentTool for GetHistoricalPricesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_historical_prices".to_string(),
            description: "Download historical OHLCV bars for a ticker. Returns at most the last \
                          60 bars."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "ticker": { "type": "string" },
                    "period": {
                        "type": "string",
                        "description": "One of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, ytd, max. Default 1mo."
                    },
                    "interval": {
                        "type": "string",
                        "description": "Bar size, e.g. 1d, 1wk, 1mo. Default 1d."
                    }
                },
                "required": ["ticker"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(ticker) = arguments.get("ticker").and_then(Value::as_str) else {
            return error_result("missing 'ticker' argument");
        };
        let period = arguments
            .get("period")
            .and_then(Value::as_str)
            .unwrap_or("1mo");
        let interval = arguments
            .get("interval")
            .and_then(Value::as_str)
            .unwrap_or("1d");
        let history = match self.market.history(ticker, period, interval).await {
            Ok(history) => history,
            Err(error) => return error_result(error),
        };
        let start = history.bars.len().saturating_sub(MAX_HISTORY_RECORDS);
        let records: Vec<Value> = history.bars[start..]
            .iter()
            .map(|bar| {
                json!({
                    "date": bar.date,
                    "open": round2(bar.open),
                    "high": round2(bar.high),
                    "low": round2(bar.low),
                    "close": round2(bar.close),
                    "volume": bar.volume,
                })
            })
            .collect();
        ToolExecutionResult::ok(json!({
            "ticker": history.ticker,
            "period": period,
            "interval": interval,
            "records": records,
        }))
    }
}

/// Batched current-price lookup.
pub struct GetMultipleStockPricesTool {
    market: Arc<MarketDataClient>,
}

impl GetMultipleStockPricesTool {
    pub fn new(market: Arc<MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl AgentTool for GetMultipleStockPricesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_multiple_stock_prices".to_string(),
            description: "Get current prices and daily change for several tickers at once (up to \
                          10)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tickers": {
                        "type": "string",
                        "description": "Comma-separated ticker symbols, e.g. \"AAPL,MSFT,GOOGL\""
                    }
                },
                "required": ["tickers"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(tickers) = arguments.get("tickers").and_then(Value::as_str) else {
            return error_result("missing 'tickers' argument");
        };
        let symbols: Vec<String> = tickers
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .take(MAX_BATCH_TICKERS)
            .collect();
        if symbols.is_empty() {
            return error_result("no tickers given");
        }
        let mut results = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.market.history(&symbol, "5d", "1d").await {
                Ok(history) => {
                    let Some(latest) = history.latest() else {
                        results.push(json!({ "ticker": symbol, "error": "no data" }));
                        continue;
                    };
                    let change_pct = history
                        .previous_close()
                        .filter(|prev| *prev != 0.0)
                        .map(|prev| round2((latest.close / prev - 1.0) * 100.0));
                    results.push(json!({
                        "ticker": history.ticker,
                        "price": round2(latest.close),
                        "change_pct": change_pct,
                        "volume": latest.volume,
                    }));
                }
                Err(error) => {
                    results.push(json!({ "ticker": symbol, "error": error.to_string() }));
                }
            }
        }
        ToolExecutionResult::ok(Value::Array(results))
    }
}
