//! Data tools the specialist roles call: market quotes and history,
//! pure statistics, price-derived factors, news and sentiment, and
//! arithmetic expression evaluation.
//!
//! Tools never return `Err`; upstream failures become structured
//! `{"error": ...}` results so a single bad lookup cannot end a turn.

use std::sync::Arc;

use quill_agent_core::AgentTool;

pub mod computation;
pub mod expression;
pub mod factors;
pub mod market;
pub mod news;

pub use expression::EvaluateExpressionTool;
pub use market::{MarketDataClient, MarketError};
pub use news::{NewsClient, NewsError};

/// Quote and history lookup tools.
pub fn financial_tools(market: Arc<MarketDataClient>) -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(market::GetStockPriceTool::new(market.clone())),
        Arc::new(market::GetHistoricalPricesTool::new(market.clone())),
        Arc::new(market::GetMultipleStockPricesTool::new(market)),
    ]
}

/// Deterministic statistics tools.
pub fn computation_tools() -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(computation::ComputeReturnsTool),
        Arc::new(computation::ComputeCorrelationTool),
        Arc::new(computation::ComputePortfolioMetricsTool),
        Arc::new(computation::ComputeMovingAveragesTool),
        Arc::new(computation::DescriptiveStatisticsTool),
    ]
}

/// Factor catalogue, per-ticker profiles, and the screen.
pub fn factor_tools(market: Arc<MarketDataClient>) -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(factors::ListFactorCategoriesTool),
        Arc::new(factors::LookupFactorTool),
        Arc::new(factors::ComputeStockFactorsTool::new(market.clone())),
        Arc::new(factors::FactorScreenTool::new(market)),
    ]
}

/// News, macro, and sentiment tools.
pub fn news_tools(news: Arc<NewsClient>) -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(news::FetchFinancialNewsTool::new(news.clone())),
        Arc::new(news::FetchMarketNewsByCategoryTool::new(news.clone())),
        Arc::new(news::FetchFredSeriesTool::new(news.clone())),
        Arc::new(news::FetchFearGreedIndexTool::new(news)),
    ]
}

/// Expression evaluation for the developer role.
pub fn developer_tools() -> Vec<Arc<dyn AgentTool>> {
    vec![Arc::new(expression::EvaluateExpressionTool)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn unit_tool_names_are_unique_across_groups() {
        let market = Arc::new(MarketDataClient::with_base_url("http://localhost").expect("client"));
        let news = Arc::new(NewsClient::with_base_urls("http://localhost", None).expect("client"));

        let mut names = HashSet::new();
        for tool in financial_tools(market.clone())
            .into_iter()
            .chain(computation_tools())
            .chain(factor_tools(market))
            .chain(news_tools(news))
            .chain(developer_tools())
        {
            assert!(
                names.insert(tool.definition().name),
                "duplicate tool name in registry"
            );
        }
        assert_eq!(names.len(), 17);
    }
}
