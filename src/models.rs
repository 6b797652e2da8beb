use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

/// One OHLCV sample for a symbol at one sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Bars keyed by symbol, ascending by timestamp within each symbol.
pub type BarsBySymbol = HashMap<String, Vec<Bar>>;

/// Bars of a single calendar day keyed by symbol.
pub type DaySlice = BTreeMap<String, Vec<Bar>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    /// Quantity-weighted average cost of the open quantity.
    pub entry_price: f64,
}

impl Position {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioState {
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
}

impl PortfolioState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            positions: BTreeMap::new(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Value of open positions, marking each at `prices[symbol]` or its entry price.
    pub fn positions_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|position| {
                let price = prices
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.entry_price);
                position.market_value(price)
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub date: NaiveDate,
    /// Cash debited for a buy, cash credited for a sell.
    pub amount: f64,
    pub profit_loss: Option<f64>,
}

impl Trade {
    pub fn buy(symbol: &str, quantity: f64, price: f64, date: NaiveDate, cost: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: TradeSide::Buy,
            quantity,
            price,
            date,
            amount: cost,
            profit_loss: None,
        }
    }

    pub fn sell(
        symbol: &str,
        quantity: f64,
        price: f64,
        date: NaiveDate,
        proceeds: f64,
        profit_loss: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: TradeSide::Sell,
            quantity,
            price,
            date,
            amount: proceeds,
            profit_loss: Some(profit_loss),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyEquitySample {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub positions_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Buy,
    Sell,
    Hold,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Buy => "buy",
            DecisionAction::Sell => "sell",
            DecisionAction::Hold => "hold",
        }
    }
}

impl FromStr for DecisionAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(DecisionAction::Buy),
            "sell" => Ok(DecisionAction::Sell),
            "hold" => Ok(DecisionAction::Hold),
            other => Err(anyhow!("Unknown decision action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub symbol: String,
    pub action: DecisionAction,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub indicator_value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Executed,
    Skipped,
    Failed,
}

/// Per-decision execution record kept alongside the trade list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub date: NaiveDate,
    pub symbol: String,
    pub action: Option<DecisionAction>,
    pub quantity: Option<f64>,
    pub status: OutcomeStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub id: String,
    #[serde(default)]
    pub parameters: HashMap<String, f64>,
}

impl StrategyConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: f64) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }
}

fn default_initial_capital() -> f64 {
    DEFAULT_INITIAL_CAPITAL
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestConfig {
    pub name: String,
    pub strategy: StrategyConfig,
    pub symbols: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub timeframe: String,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    pub total_trades: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    pub id: String,
    pub config: BacktestConfig,
    pub trades: Vec<Trade>,
    pub daily_equity: Vec<DailyEquitySample>,
    pub decision_log: Vec<DecisionOutcome>,
    pub metrics: PerformanceMetrics,
    pub final_portfolio: PortfolioState,
    pub created_at: DateTime<Utc>,
}

impl BacktestResult {
    pub fn failed_decisions(&self) -> impl Iterator<Item = &DecisionOutcome> {
        self.decision_log
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Failed)
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.daily_equity.last().map(|sample| sample.equity)
    }
}

/// Receipt returned by a persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBacktest {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_value_falls_back_to_entry_price() {
        let mut state = PortfolioState::new(1_000.0);
        state.positions.insert(
            "AAA".to_string(),
            Position {
                symbol: "AAA".to_string(),
                quantity: 2.0,
                entry_price: 10.0,
            },
        );
        state.positions.insert(
            "BBB".to_string(),
            Position {
                symbol: "BBB".to_string(),
                quantity: 3.0,
                entry_price: 20.0,
            },
        );

        let prices = HashMap::from([("AAA".to_string(), 12.0)]);
        assert!((state.positions_value(&prices) - (24.0 + 60.0)).abs() < 1e-9);
    }

    #[test]
    fn decision_action_parses_case_insensitively() {
        assert_eq!(" BUY ".parse::<DecisionAction>().unwrap(), DecisionAction::Buy);
        assert_eq!("Sell".parse::<DecisionAction>().unwrap(), DecisionAction::Sell);
        assert!("short".parse::<DecisionAction>().is_err());
    }

    #[test]
    fn backtest_config_defaults_initial_capital() {
        let raw = r#"{
            "name": "rsi-daily",
            "strategy": { "id": "momentum", "parameters": { "period": 14 } },
            "symbols": ["AAPL"],
            "startDate": "2023-01-01T00:00:00Z",
            "endDate": "2023-06-30T00:00:00Z",
            "timeframe": "1Day"
        }"#;

        let config: BacktestConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.initial_capital, DEFAULT_INITIAL_CAPITAL);
        assert_eq!(config.strategy.parameters.get("period"), Some(&14.0));
    }

    #[test]
    fn decision_deserializes_without_optional_fields() {
        let decision: Decision =
            serde_json::from_str(r#"{ "symbol": "MSFT", "action": "sell" }"#).unwrap();
        assert_eq!(decision.action, DecisionAction::Sell);
        assert!(decision.quantity.is_none());
    }
}
