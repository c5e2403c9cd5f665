//! Pure statistical tools: return series analysis, correlation,
//! portfolio metrics, moving averages, descriptive statistics.
//!
//! Everything here is deterministic over its arguments; no IO.

use async_trait::async_trait;
use serde_json::{json, Value};

use quill_agent_core::{AgentTool, ToolExecutionResult};
use quill_ai::ToolDefinition;

const TRADING_DAYS: f64 = 252.0;

pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub(crate) fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mu = mean(data);
    let var = data.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}

/// Sample covariance (n - 1 denominator). Lengths must match.
pub(crate) fn covariance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || a.len() != b.len() {
        return 0.0;
    }
    let (mu_a, mu_b) = (mean(a), mean(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - mu_a) * (y - mu_b))
        .sum::<f64>()
        / (a.len() - 1) as f64
}

pub(crate) fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let (sd_a, sd_b) = (std_dev(a), std_dev(b));
    if sd_a == 0.0 || sd_b == 0.0 {
        return None;
    }
    Some(covariance(a, b) / (sd_a * sd_b))
}

pub(crate) fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Largest peak-to-trough loss, as a negative fraction.
pub(crate) fn max_drawdown(prices: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &price in prices {
        peak = peak.max(price);
        if peak > 0.0 {
            worst = worst.min(price / peak - 1.0);
        }
    }
    worst
}

pub(crate) fn simple_moving_average(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    Some(mean(&prices[prices.len() - window..]))
}

pub(crate) fn exponential_moving_average(prices: &[f64], window: usize) -> Option<f64> {
    if window == 0 || prices.len() < window {
        return None;
    }
    let alpha = 2.0 / (window as f64 + 1.0);
    let mut ema = prices[0];
    for &price in &prices[1..] {
        ema = alpha * price + (1.0 - alpha) * ema;
    }
    Some(ema)
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn number_array(arguments: &Value, key: &str) -> Result<Vec<f64>, String> {
    let raw = arguments
        .get(key)
        .ok_or_else(|| format!("missing '{key}' argument"))?;
    // Accept either a JSON array or a JSON-encoded array string.
    let parsed: Value = match raw {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|_| format!("'{key}' is not a JSON array"))?
        }
        other => other.clone(),
    };
    let Value::Array(items) = parsed else {
        return Err(format!("'{key}' must be an array of numbers"));
    };
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .ok_or_else(|| format!("'{key}' contains a non-numeric entry"))
        })
        .collect()
}

fn error_result(message: impl Into<String>) -> ToolExecutionResult {
    ToolExecutionResult::error(json!({ "error": message.into() }))
}

/// Return-series analysis from sequential close prices.
pub struct ComputeReturnsTool;

#[async_trait]
impl AgentTool for ComputeReturnsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "compute_returns".to_string(),
            description: "Compute simple and log returns, cumulative return, volatility, Sharpe \
                          approximation, and max drawdown from a list of sequential close prices."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "prices": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "Sequential close prices, oldest first"
                    }
                },
                "required": ["prices"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let prices = match number_array(&arguments, "prices") {
            Ok(prices) => prices,
            Err(error) => return error_result(error),
        };
        if prices.len() < 2 {
            return error_result("need at least 2 prices");
        }
        if prices[0] == 0.0 {
            return error_result("first price must be non-zero");
        }
        let returns = simple_returns(&prices);
        let log_returns: Vec<f64> = prices
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect();
        let mu = mean(&returns);
        let sd = std_dev(&returns);
        let sharpe = if sd > 0.0 {
            Some(round_to(mu / sd * TRADING_DAYS.sqrt(), 4))
        } else {
            None
        };
        ToolExecutionResult::ok(json!({
            "simple_returns": returns.iter().map(|r| round_to(*r, 6)).collect::<Vec<_>>(),
            "log_returns": log_returns.iter().map(|r| round_to(*r, 6)).collect::<Vec<_>>(),
            "cumulative_return_pct": round_to((prices[prices.len() - 1] / prices[0] - 1.0) * 100.0, 4),
            "mean_return_pct": round_to(mu * 100.0, 4),
            "std_dev_pct": round_to(sd * 100.0, 4),
            "annualized_vol_pct": round_to(sd * TRADING_DAYS.sqrt() * 100.0, 4),
            "sharpe_approx": sharpe,
            "max_drawdown_pct": round_to(max_drawdown(&prices) * 100.0, 4),
            "n_periods": returns.len(),
        }))
    }
}

/// Pearson correlation, covariance, and beta between two series.
pub struct ComputeCorrelationTool;

#[async_trait]
impl AgentTool for ComputeCorrelationTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "compute_correlation".to_string(),
            description: "Compute Pearson correlation, covariance, and beta between two numeric \
                          series of the same length (prices or returns)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "series_a": { "type": "array", "items": { "type": "number" } },
                    "series_b": { "type": "array", "items": { "type": "number" } }
                },
                "required": ["series_a", "series_b"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let a = match number_array(&arguments, "series_a") {
            Ok(series) => series,
            Err(error) => return error_result(error),
        };
        let b = match number_array(&arguments, "series_b") {
            Ok(series) => series,
            Err(error) => return error_result(error),
        };
        if a.len() != b.len() {
            return error_result("series must be the same length");
        }
        if a.len() < 2 {
            return error_result("need at least 2 observations");
        }
        let var_b = std_dev(&b).powi(2);
        let beta = if var_b > 0.0 {
            Some(round_to(covariance(&a, &b) / var_b, 6))
        } else {
            None
        };
        ToolExecutionResult::ok(json!({
            "correlation": pearson_correlation(&a, &b).map(|c| round_to(c, 6)),
            "covariance": round_to(covariance(&a, &b), 8),
            "beta": beta,
            "n": a.len(),
        }))
    }
}

/// Portfolio-level risk and return from weights and a returns matrix.
pub struct ComputePortfolioMetricsTool;

#[async_trait]
impl AgentTool for ComputePortfolioMetricsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "compute_portfolio_metrics".to_string(),
            description: "Compute portfolio return, volatility, Sharpe ratio, and per-asset risk \
                          contribution from weights and per-asset return series."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "weights": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "Portfolio weights, should sum to ~1.0"
                    },
                    "returns_matrix": {
                        "type": "array",
                        "items": { "type": "array", "items": { "type": "number" } },
                        "description": "One return series per asset, equal lengths"
                    }
                },
                "required": ["weights", "returns_matrix"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let weights = match number_array(&arguments, "weights") {
            Ok(weights) => weights,
            Err(error) => return error_result(error),
        };
        let matrix = match returns_matrix(&arguments) {
            Ok(matrix) => matrix,
            Err(error) => return error_result(error),
        };
        if matrix.len() != weights.len() {
            return error_result(format!(
                "weight count ({}) does not match asset count ({})",
                weights.len(),
                matrix.len()
            ));
        }
        let n_assets = weights.len();
        let mean_returns: Vec<f64> = matrix.iter().map(|series| mean(series)).collect();
        let mut cov = vec![vec![0.0; n_assets]; n_assets];
        for i in 0..n_assets {
            for j in 0..n_assets {
                cov[i][j] = covariance(&matrix[i], &matrix[j]);
            }
        }

        let port_return: f64 = weights.iter().zip(&mean_returns).map(|(w, r)| w * r).sum();
        // marginal_i = (cov @ w)_i
        let marginal: Vec<f64> = (0..n_assets)
            .map(|i| (0..n_assets).map(|j| cov[i][j] * weights[j]).sum())
            .collect();
        let port_var: f64 = weights.iter().zip(&marginal).map(|(w, m)| w * m).sum();
        let port_vol = port_var.max(0.0).sqrt();
        let sharpe = if port_vol > 0.0 {
            Some(round_to(port_return / port_vol * TRADING_DAYS.sqrt(), 4))
        } else {
            None
        };
        let risk_contrib: Vec<f64> = weights.iter().zip(&marginal).map(|(w, m)| w * m).collect();
        let total_risk: f64 = risk_contrib.iter().sum();
        let pct_contrib: Vec<f64> = risk_contrib
            .iter()
            .map(|c| {
                if total_risk > 0.0 {
                    round_to(c / total_risk * 100.0, 2)
                } else {
                    round_to(*c, 2)
                }
            })
            .collect();

        ToolExecutionResult::ok(json!({
            "portfolio_daily_return_pct": round_to(port_return * 100.0, 4),
            "portfolio_annualized_return_pct": round_to(port_return * TRADING_DAYS * 100.0, 4),
            "portfolio_daily_vol_pct": round_to(port_vol * 100.0, 4),
            "portfolio_annualized_vol_pct": round_to(port_vol * TRADING_DAYS.sqrt() * 100.0, 4),
            "sharpe_ratio": sharpe,
            "weights": weights.iter().map(|w| round_to(*w, 4)).collect::<Vec<_>>(),
            "risk_contribution_pct": pct_contrib,
        }))
    }
}

fn returns_matrix(arguments: &Value) -> Result<Vec<Vec<f64>>, String> {
    let raw = arguments
        .get("returns_matrix")
        .ok_or("missing 'returns_matrix' argument")?;
    let parsed: Value = match raw {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|_| "'returns_matrix' is not a JSON array")?
        }
        other => other.clone(),
    };
    let Value::Array(rows) = parsed else {
        return Err("'returns_matrix' must be a 2-D array".to_string());
    };
    let mut matrix = Vec::with_capacity(rows.len());
    let mut expected_len = None;
    for row in rows {
        let Value::Array(items) = row else {
            return Err("'returns_matrix' must contain arrays".to_string());
        };
        let series: Vec<f64> = items
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or("'returns_matrix' contains a non-numeric entry".to_string())
            })
            .collect::<Result<_, _>>()?;
        if series.len() < 2 {
            return Err("each return series needs at least 2 observations".to_string());
        }
        if *expected_len.get_or_insert(series.len()) != series.len() {
            return Err("all return series must be the same length".to_string());
        }
        matrix.push(series);
    }
    if matrix.is_empty() {
        return Err("'returns_matrix' is empty".to_string());
    }
    Ok(matrix)
}

/// Latest SMA and EMA values for the requested windows.
pub struct ComputeMovingAveragesTool;

#[async_trait]
impl AgentTool for ComputeMovingAveragesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "compute_moving_averages".to_string(),
            description: "Compute the latest simple and exponential moving averages for the given \
                          windows over a price series."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "prices": { "type": "array", "items": { "type": "number" } },
                    "windows": {
                        "type": "string",
                        "description": "Comma-separated window sizes, default \"20,50,200\""
                    }
                },
                "required": ["prices"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let prices = match number_array(&arguments, "prices") {
            Ok(prices) => prices,
            Err(error) => return error_result(error),
        };
        if prices.is_empty() {
            return error_result("need at least 1 price");
        }
        let windows_raw = arguments
            .get("windows")
            .and_then(Value::as_str)
            .unwrap_or("20,50,200");
        let mut windows = Vec::new();
        for part in windows_raw.split(',') {
            match part.trim().parse::<usize>() {
                Ok(window) if window > 0 => windows.push(window),
                _ => return error_result(format!("invalid window '{}'", part.trim())),
            }
        }
        let mut result = serde_json::Map::new();
        result.insert(
            "latest_price".to_string(),
            json!(round_to(prices[prices.len() - 1], 2)),
        );
        for window in windows {
            result.insert(
                format!("SMA_{window}"),
                json!(simple_moving_average(&prices, window).map(|v| round_to(v, 2))),
            );
            result.insert(
                format!("EMA_{window}"),
                json!(exponential_moving_average(&prices, window).map(|v| round_to(v, 2))),
            );
        }
        ToolExecutionResult::ok(Value::Object(result))
    }
}

/// Count, central moments, and percentiles of a numeric series.
pub struct DescriptiveStatisticsTool;

#[async_trait]
impl AgentTool for DescriptiveStatisticsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "descriptive_statistics".to_string(),
            description: "Return count, mean, median, std, min, max, skewness, kurtosis, and \
                          percentiles for a numeric series."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "number" } }
                },
                "required": ["data"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let data = match number_array(&arguments, "data") {
            Ok(data) => data,
            Err(error) => return error_result(error),
        };
        if data.is_empty() {
            return error_result("need at least 1 observation");
        }
        let mut sorted = data.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mu = mean(&data);
        let sd = std_dev(&data);
        let n = data.len() as f64;
        let (skew, kurtosis) = if sd > 0.0 && data.len() > 2 {
            let m3 = data.iter().map(|x| ((x - mu) / sd).powi(3)).sum::<f64>() / n;
            let m4 = data.iter().map(|x| ((x - mu) / sd).powi(4)).sum::<f64>() / n;
            (Some(round_to(m3, 6)), Some(round_to(m4 - 3.0, 6)))
        } else {
            (None, None)
        };
        ToolExecutionResult::ok(json!({
            "count": data.len(),
            "mean": round_to(mu, 6),
            "median": round_to(percentile(&sorted, 0.5), 6),
            "std": round_to(sd, 6),
            "min": round_to(sorted[0], 6),
            "max": round_to(sorted[sorted.len() - 1], 6),
            "skewness": skew,
            "kurtosis": kurtosis,
            "p25": round_to(percentile(&sorted, 0.25), 6),
            "p75": round_to(percentile(&sorted, 0.75), 6),
            "p95": round_to(percentile(&sorted, 0.95), 6),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_agent_core::AgentTool;
    use serde_json::json;

    #[test]
    fn unit_stats_helpers() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(mean(&data), 2.5);
        assert!((std_dev(&data) - 1.290_994_4).abs() < 1e-6);
        assert_eq!(max_drawdown(&[100.0, 120.0, 90.0, 110.0]), 90.0 / 120.0 - 1.0);
        assert_eq!(simple_moving_average(&[1.0, 2.0, 3.0], 2), Some(2.5));
        assert_eq!(simple_moving_average(&[1.0], 5), None);
    }

    #[test]
    fn unit_perfect_correlation() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert!((pearson_correlation(&a, &b).expect("corr") - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn functional_compute_returns_over_price_series() {
        let result = ComputeReturnsTool
            .execute(json!({ "prices": [100.0, 102.0, 101.0, 105.0] }))
            .await;
        assert!(!result.is_error);
        let body: serde_json::Value =
            serde_json::from_str(&result.as_text()).expect("json body");
        assert_eq!(body["n_periods"], 3);
        assert_eq!(body["cumulative_return_pct"], 5.0);
        assert!(body["max_drawdown_pct"].as_f64().expect("dd") < 0.0);
    }

    #[tokio::test]
    async fn functional_returns_accepts_json_encoded_string_argument() {
        // Models frequently pass array arguments as JSON strings.
        let result = ComputeReturnsTool
            .execute(json!({ "prices": "[100, 102, 101, 105]" }))
            .await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn functional_portfolio_metrics_shape() {
        let result = ComputePortfolioMetricsTool
            .execute(json!({
                "weights": [0.5, 0.5],
                "returns_matrix": [[0.01, -0.02, 0.015], [0.005, 0.01, -0.005]]
            }))
            .await;
        assert!(!result.is_error);
        let body: serde_json::Value =
            serde_json::from_str(&result.as_text()).expect("json body");
        assert_eq!(body["risk_contribution_pct"].as_array().expect("arr").len(), 2);
        assert!(body["portfolio_daily_vol_pct"].as_f64().expect("vol") > 0.0);
    }

    #[tokio::test]
    async fn regression_mismatched_lengths_are_reported_not_panicked() {
        let result = ComputeCorrelationTool
            .execute(json!({ "series_a": [1.0, 2.0], "series_b": [1.0, 2.0, 3.0] }))
            .await;
        assert!(result.is_error);
        assert!(result.as_text().contains("same length"));

        let result = ComputePortfolioMetricsTool
            .execute(json!({ "weights": [1.0], "returns_matrix": [[0.01, 0.02], [0.01, 0.02]] }))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn functional_moving_averages_report_null_for_short_series() {
        let result = ComputeMovingAveragesTool
            .execute(json!({ "prices": [1.0, 2.0, 3.0, 4.0, 5.0], "windows": "3,200" }))
            .await;
        assert!(!result.is_error);
        let body: serde_json::Value =
            serde_json::from_str(&result.as_text()).expect("json body");
        assert_eq!(body["SMA_3"], 4.0);
        assert!(body["SMA_200"].is_null());
    }

    #[tokio::test]
    async fn functional_descriptive_statistics() {
        let result = DescriptiveStatisticsTool
            .execute(json!({ "data": [1.0, 2.0, 3.0, 4.0, 100.0] }))
            .await;
        assert!(!result.is_error);
        let body: serde_json::Value =
            serde_json::from_str(&result.as_text()).expect("json body");
        assert_eq!(body["count"], 5);
        assert_eq!(body["median"], 3.0);
        assert!(body["skewness"].as_f64().expect("skew") > 0.0);
    }
}
