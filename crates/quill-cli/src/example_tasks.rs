//! Canned tasks runnable by name from the command line.

pub const EXAMPLE_TASKS: &[(&str, &str)] = &[
    (
        "market_analysis",
        "Perform a comprehensive analysis of the current technology sector. \
         Get the latest prices for AAPL, MSFT, GOOGL, NVDA, and META. \
         Compute their recent returns and volatility. \
         Fetch recent market news about these companies. \
         Provide a summary of which stocks look strongest and any risks.",
    ),
    (
        "portfolio_review",
        "I have a portfolio with the following allocation: \
         40% AAPL, 25% MSFT, 20% GOOGL, 15% AMZN. \
         Analyse the portfolio's recent performance, compute risk metrics \
         (volatility, Sharpe ratio, max drawdown), assess diversification, \
         and suggest any rebalancing changes.",
    ),
    (
        "macro_research",
        "Research the current macroeconomic environment. \
         What are the latest trends in interest rates, inflation, and employment? \
         Fetch recent financial news about Federal Reserve policy. \
         How might the macro environment affect equity markets in the near term? \
         Provide specific data points and a structured analysis.",
    ),
    (
        "quant_screen",
        "Run a quantitative comparison of AAPL vs MSFT. \
         Get 3 months of historical prices for both stocks. \
         Compute returns, volatility, Sharpe ratio, \
         correlation between the two, and moving averages. \
         Rank both with a factor screen and present the results in a \
         structured format.",
    ),
];

pub fn lookup(name: &str) -> Option<&'static str> {
    EXAMPLE_TASKS
        .iter()
        .find(|(task_name, _)| *task_name == name)
        .map(|(_, text)| *text)
}
