pub mod commands;
pub mod comparator;
pub mod config;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod indicators;
pub mod ledger;
pub mod market_data;
pub mod models;
pub mod oracle;
pub mod param_utils;
pub mod performance;
pub mod progress;
pub mod sink;
pub mod strategy;
pub mod walker;

pub use engine::BacktestEngine;
pub use error::{BacktestError, ComparatorError, ConfigError, LedgerError};
