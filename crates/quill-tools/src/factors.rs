//! Price-derived factor tools: a reference catalogue, per-ticker
//! factor profiles, and a multi-ticker screen.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use quill_agent_core::{AgentTool, ToolExecutionResult};
use quill_ai::ToolDefinition;

use crate::computation::{
    max_drawdown, mean, pearson_correlation, simple_moving_average, simple_returns, std_dev,
};
use crate::market::{MarketDataClient, MarketError};

/// Benchmark used for beta and relative strength.
const BENCHMARK_TICKER: &str = "SPY";
const TRADING_DAYS: f64 = 252.0;
/// Roughly one trading month of daily bars.
const MONTH_BARS: usize = 21;
const MAX_SCREEN_TICKERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `FactorCategory` values.
pub enum FactorCategory {
    Momentum,
    Risk,
    Trend,
}

impl FactorCategory {
    fn as_str(&self) -> &'static str {
        match self {
            FactorCategory::Momentum => "momentum",
            FactorCategory::Risk => "risk",
            FactorCategory::Trend => "trend",
        }
    }
}

/// One catalogue entry.
#[derive(Debug, Clone, Copy)]
pub struct FactorDef {
    pub id: &'static str,
    pub name: &'static str,
    pub category: FactorCategory,
    /// "higher" when larger values are better, "lower" otherwise.
    pub higher_is: &'static str,
    pub description: &'static str,
    pub interpretation: &'static str,
}

pub const FACTORS: &[FactorDef] = &[
    FactorDef {
        id: "momentum_12m",
        name: "12-Month Momentum (ex most recent month)",
        category: FactorCategory::Momentum,
        higher_is: "higher",
        description: "Total return over the trailing year, excluding the most recent month to \
                      avoid short-term reversal.",
        interpretation: "Above ~0.15 indicates strong positive momentum; below zero indicates a \
                         downtrend over the year.",
    },
    FactorDef {
        id: "return_1m",
        name: "1-Month Return",
        category: FactorCategory::Momentum,
        higher_is: "higher",
        description: "Total return over the most recent trading month.",
        interpretation: "Short-horizon strength; extreme values often mean-revert.",
    },
    FactorDef {
        id: "return_3m",
        name: "3-Month Return",
        category: FactorCategory::Momentum,
        higher_is: "higher",
        description: "Total return over the trailing quarter.",
        interpretation: "Medium-horizon trend confirmation.",
    },
    FactorDef {
        id: "return_6m",
        name: "6-Month Return",
        category: FactorCategory::Momentum,
        higher_is: "higher",
        description: "Total return over the trailing half year.",
        interpretation: "Medium-horizon trend confirmation.",
    },
    FactorDef {
        id: "annualized_vol",
        name: "Annualized Volatility",
        category: FactorCategory::Risk,
        higher_is: "lower",
        description: "Standard deviation of daily returns scaled to one year.",
        interpretation: "Below ~0.20 is calm for a large cap; above ~0.40 is highly volatile.",
    },
    FactorDef {
        id: "max_drawdown",
        name: "Maximum Drawdown",
        category: FactorCategory::Risk,
        higher_is: "higher",
        description: "Largest peak-to-trough loss over the trailing year, as a negative fraction.",
        interpretation: "Closer to zero is better; -0.30 means the stock lost 30% from its peak.",
    },
    FactorDef {
        id: "beta",
        name: "Beta vs SPY",
        category: FactorCategory::Risk,
        higher_is: "lower",
        description: "Sensitivity of daily returns to the SPY benchmark over the trailing year.",
        interpretation: "1.0 moves with the market; above 1.3 amplifies market swings.",
    },
    FactorDef {
        id: "sharpe",
        name: "Sharpe Approximation",
        category: FactorCategory::Risk,
        higher_is: "higher",
        description: "Annualized mean daily return over annualized volatility, zero risk-free \
                      rate.",
        interpretation: "Above 1.0 is strong risk-adjusted performance.",
    },
    FactorDef {
        id: "price_to_sma50",
        name: "Price vs 50-Day SMA",
        category: FactorCategory::Trend,
        higher_is: "higher",
        description: "Latest close divided by the 50-day simple moving average, minus one.",
        interpretation: "Positive means the stock trades above its medium-term trend.",
    },
    FactorDef {
        id: "price_to_sma200",
        name: "Price vs 200-Day SMA",
        category: FactorCategory::Trend,
        higher_is: "higher",
        description: "Latest close divided by the 200-day simple moving average, minus one.",
        interpretation: "Positive means the stock trades above its long-term trend.",
    },
];

pub fn factor(id: &str) -> Option<&'static FactorDef> {
    FACTORS
        .iter()
        .find(|def| def.id.eq_ignore_ascii_case(id.trim()))
}

/// Screen presets mapped to factor id lists.
const SCREEN_PRESETS: &[(&str, &[&str])] = &[
    (
        "growth_momentum",
        &["momentum_12m", "return_3m", "price_to_sma50"],
    ),
    ("defensive", &["annualized_vol", "beta", "max_drawdown"]),
    ("low_volatility", &["annualized_vol", "beta"]),
    (
        "comprehensive",
        &[
            "momentum_12m",
            "return_3m",
            "annualized_vol",
            "beta",
            "max_drawdown",
            "sharpe",
            "price_to_sma200",
        ],
    ),
];

fn preset(name: &str) -> Option<&'static [&'static str]> {
    SCREEN_PRESETS
        .iter()
        .find(|(preset_name, _)| preset_name.eq_ignore_ascii_case(name.trim()))
        .map(|(_, ids)| *ids)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Factor values computed from one year of daily closes.
async fn factor_profile(
    market: &MarketDataClient,
    ticker: &str,
) -> Result<BTreeMap<&'static str, Option<f64>>, MarketError> {
    let history = market.history(ticker, "1y", "1d").await?;
    let closes = history.closes();
    let returns = simple_returns(&closes);
    let latest = *closes.last().unwrap_or(&0.0);

    let window_return = |bars: usize| -> Option<f64> {
        if closes.len() <= bars {
            return None;
        }
        let past = closes[closes.len() - 1 - bars];
        if past == 0.0 {
            return None;
        }
        Some(latest / past - 1.0)
    };
    // 12m momentum excludes the most recent month.
    let momentum_12m = if closes.len() > MONTH_BARS + 1 {
        let month_ago = closes[closes.len() - 1 - MONTH_BARS];
        let start = closes[0];
        if start == 0.0 {
            None
        } else {
            Some(month_ago / start - 1.0)
        }
    } else {
        None
    };

    let sd = std_dev(&returns);
    let annualized_vol = if returns.len() > 1 {
        Some(sd * TRADING_DAYS.sqrt())
    } else {
        None
    };
    let sharpe = if sd > 0.0 {
        Some(mean(&returns) / sd * TRADING_DAYS.sqrt())
    } else {
        None
    };

    // Beta is best-effort: a missing benchmark degrades the profile
    // instead of failing the whole lookup.
    let beta = match market.history(BENCHMARK_TICKER, "1y", "1d").await {
        Ok(benchmark) => {
            let bench_returns = simple_returns(&benchmark.closes());
            let n = returns.len().min(bench_returns.len());
            if n > 2 {
                let a = &returns[returns.len() - n..];
                let b = &bench_returns[bench_returns.len() - n..];
                let var_b = std_dev(b).powi(2);
                if var_b > 0.0 {
                    pearson_correlation(a, b).map(|corr| corr * std_dev(a) / std_dev(b))
                } else {
                    None
                }
            } else {
                None
            }
        }
        Err(_) => None,
    };

    let vs_sma = |window: usize| -> Option<f64> {
        let sma = simple_moving_average(&closes, window)?;
        if sma == 0.0 {
            return None;
        }
        Some(latest / sma - 1.0)
    };

    let mut profile = BTreeMap::new();
    profile.insert("momentum_12m", momentum_12m);
    profile.insert("return_1m", window_return(MONTH_BARS));
    profile.insert("return_3m", window_return(MONTH_BARS * 3));
    profile.insert("return_6m", window_return(MONTH_BARS * 6));
    profile.insert("annualized_vol", annualized_vol);
    profile.insert(
        "max_drawdown",
        if closes.len() > 1 {
            Some(max_drawdown(&closes))
        } else {
            None
        },
    );
    profile.insert("beta", beta);
    profile.insert("sharpe", sharpe);
    profile.insert("price_to_sma50", vs_sma(50));
    profile.insert("price_to_sma200", vs_sma(200));
    Ok(profile)
}

fn profile_to_json(ticker: &str, profile: &BTreeMap<&'static str, Option<f64>>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert("ticker".to_string(), json!(ticker.to_uppercase()));
    for (id, value) in profile {
        map.insert((*id).to_string(), json!(value.map(round4)));
    }
    Value::Object(map)
}

fn error_result(message: impl std::fmt::Display) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({ "error": message.to_string() }))
}

/// Catalogue listing grouped by category.
pub struct ListFactorCategoriesTool;

#[async_trait]
impl AgentTool for ListFactorCategoriesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_factor_categories".to_string(),
            description: "List all available investment factor categories and their factors."
                .to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        let mut grouped: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
        for def in FACTORS {
            grouped.entry(def.category.as_str()).or_default().push(json!({
                "id": def.id,
                "name": def.name,
                "direction": def.higher_is,
            }));
        }
        ToolExecutionResult::ok(json!(grouped))
    }
}

/// Catalogue lookup with interpretation guidance.
pub struct LookupFactorTool;

#[async_trait]
impl AgentTool for LookupFactorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "lookup_factor".to_string(),
            description: "Look up the definition and interpretation guidance for a specific \
                          investment factor."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "factor_id": {
                        "type": "string",
                        "description": "Factor id, e.g. \"momentum_12m\" or \"beta\""
                    }
                },
                "required": ["factor_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(factor_id) = arguments.get("factor_id").and_then(Value::as_str) else {
            return error_result("missing 'factor_id' argument");
        };
        let Some(def) = factor(factor_id) else {
            return ToolExecutionResult::error(json!({
                "error": format!("factor '{factor_id}' not found"),
                "available": FACTORS.iter().map(|d| d.id).collect::<Vec<_>>(),
            }));
        };
        ToolExecutionResult::ok(json!({
            "factor_id": def.id,
            "name": def.name,
            "category": def.category.as_str(),
            "description": def.description,
            "higher_is": def.higher_is,
            "interpretation": def.interpretation,
        }))
    }
}

/// Full factor profile for one ticker.
pub struct ComputeStockFactorsTool {
    market: Arc<MarketDataClient>,
}

impl ComputeStockFactorsTool {
    pub fn new(market: Arc<MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl AgentTool for ComputeStockFactorsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "compute_stock_factors".to_string(),
            description: "Compute a full price-derived factor profile for a ticker: momentum, \
                          multi-horizon returns, volatility, max drawdown, beta vs SPY, Sharpe, \
                          and trend factors."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "ticker": { "type": "string" }
                },
                "required": ["ticker"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(ticker) = arguments.get("ticker").and_then(Value::as_str) else {
            return error_result("missing 'ticker' argument");
        };
        match factor_profile(&self.market, ticker).await {
            Ok(profile) => ToolExecutionResult::ok(profile_to_json(ticker, &profile)),
            Err(error) => error_result(error),
        }
    }
}

/// Multi-ticker composite ranking.
pub struct FactorScreenTool {
    market: Arc<MarketDataClient>,
}

impl FactorScreenTool {
    pub fn new(market: Arc<MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl AgentTool for FactorScreenTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "factor_screen".to_string(),
            description: "Rank several tickers (up to 8) by a composite factor score. Presets: \
                          growth_momentum, defensive, low_volatility, comprehensive."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tickers": {
                        "type": "string",
                        "description": "Comma-separated ticker symbols"
                    },
                    "preset": {
                        "type": "string",
                        "description": "Screen preset, default \"comprehensive\""
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
        let preset_name = arguments
            .get("preset")
            .and_then(Value::as_str)
            .unwrap_or("comprehensive");
        let Some(factor_ids) = preset(preset_name) else {
            return ToolExecutionResult::error(json!({
                "error": format!("unknown preset '{preset_name}'"),
                "available": SCREEN_PRESETS.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            }));
        };
        let symbols: Vec<String> = tickers
            .split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .take(MAX_SCREEN_TICKERS)
            .collect();
        if symbols.len() < 2 {
            return error_result("need at least 2 tickers to screen");
        }

        let mut profiles = Vec::new();
        let mut failures = Vec::new();
        for symbol in &symbols {
            match factor_profile(&self.market, symbol).await {
                Ok(profile) => profiles.push((symbol.clone(), profile)),
                Err(error) => failures.push(json!({
                    "ticker": symbol,
                    "error": error.to_string(),
                })),
            }
        }
        if profiles.len() < 2 {
            return ToolExecutionResult::error(json!({
                "error": "not enough tickers with data to rank",
                "failures": failures,
            }));
        }

        // Composite score: direction-signed z-score per factor, summed.
        let mut scores: Vec<f64> = vec![0.0; profiles.len()];
        for factor_id in factor_ids {
            let def = match factor(factor_id) {
                Some(def) => def,
                None => continue,
            };
            let values: Vec<Option<f64>> = profiles
                .iter()
                .map(|(_, profile)| profile.get(factor_id).copied().flatten())
                .collect();
            let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
            if present.len() < 2 {
                continue;
            }
            let (mu, sd) = (mean(&present), std_dev(&present));
            if sd == 0.0 {
                continue;
            }
            let sign = if def.higher_is == "higher" { 1.0 } else { -1.0 };
            for (index, value) in values.iter().enumerate() {
                if let Some(value) = value {
                    scores[index] += sign * (value - mu) / sd;
                }
            }
        }

        let mut ranked: Vec<Value> = profiles
            .iter()
            .zip(&scores)
            .map(|((symbol, profile), score)| {
                let mut entry = profile_to_json(symbol, profile);
                entry["composite_score"] = json!(round4(*score));
                entry
            })
            .collect();
        ranked.sort_by(|a, b| {
            let score_a = a["composite_score"].as_f64().unwrap_or(f64::NEG_INFINITY);
            let score_b = b["composite_score"].as_f64().unwrap_or(f64::NEG_INFINITY);
            score_b.total_cmp(&score_a)
        });

        ToolExecutionResult::ok(json!({
            "preset": preset_name,
            "factors": factor_ids,
            "ranked": ranked,
            "failures": failures,
        }))
    }
}
