use chrono::NaiveDate;
use thiserror::Error;

/// Order rejections raised by the portfolio ledger. No state is mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient funds for {symbol}: need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        symbol: String,
        required: f64,
        available: f64,
    },
    #[error("no open position for {symbol}")]
    NoPosition { symbol: String },
    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: f64,
        held: f64,
    },
    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: String, reason: String },
}

/// Errors that abort a backtest run.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid backtest configuration: {0}")]
    Configuration(String),
    #[error("failed to fetch historical data: {0:#}")]
    DataFetch(anyhow::Error),
    #[error("decision source failed: {0:#}")]
    DecisionSource(anyhow::Error),
    #[error("backtest cancelled before simulating {date}")]
    Cancelled { date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparatorError {
    #[error("cannot compare an empty set of backtest results")]
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("setting {key} is invalid (value: {value}): {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{first} and {second} must both be set")]
    Incomplete { first: String, second: String },
}
