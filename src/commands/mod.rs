pub mod compare;
pub mod run;

use crate::config::EngineSettings;
use crate::engine::BacktestEngine;
use crate::market_data::SnapshotMarketData;
use crate::models::BacktestConfig;
use crate::oracle::HttpDecisionOracle;
use crate::sink::{ApiResultSink, JsonFileSink, ResultSink};
use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const API_SINK_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads a JSON backtest config, filling `initialCapital` from settings when absent.
pub fn load_config(path: &Path, settings: &EngineSettings) -> Result<BacktestConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backtest config {}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Backtest config {} is not valid JSON", path.display()))?;

    if let Some(object) = value.as_object_mut() {
        object
            .entry("initialCapital")
            .or_insert_with(|| serde_json::json!(settings.default_initial_capital));
    }

    serde_json::from_value(value)
        .with_context(|| format!("Backtest config {} is malformed", path.display()))
}

pub fn build_engine(
    settings: &EngineSettings,
    data_path: &Path,
    store: bool,
) -> Result<BacktestEngine> {
    let market_data = SnapshotMarketData::load(data_path)?;
    let mut engine = BacktestEngine::new(Arc::new(market_data))
        .with_cancellation(install_ctrl_c_flag());

    if let Some(oracle) = &settings.oracle {
        let client = HttpDecisionOracle::new(&oracle.url, oracle.secret.clone(), oracle.timeout)?;
        engine = engine.with_oracle(Arc::new(client));
    }

    if store {
        engine = engine.with_sink(build_sink(settings)?);
    }

    Ok(engine)
}

fn build_sink(settings: &EngineSettings) -> Result<Arc<dyn ResultSink>> {
    if let Some(api) = &settings.api {
        let sink = ApiResultSink::new(&api.base_url, api.secret.clone(), API_SINK_TIMEOUT)?;
        return Ok(Arc::new(sink));
    }
    if let Some(dir) = &settings.results_dir {
        return Ok(Arc::new(JsonFileSink::new(dir.clone())));
    }
    Err(anyhow!(
        "--store requires BACKTEST_API_URL or BACKTEST_RESULTS_DIR to be set"
    ))
}

fn install_ctrl_c_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current simulated day");
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}

pub fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_missing_initial_capital_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "name": "rsi",
                "strategy": { "id": "momentum" },
                "symbols": ["AAPL"],
                "startDate": "2023-01-01T00:00:00Z",
                "endDate": "2023-12-31T00:00:00Z",
                "timeframe": "1Day"
            }"#,
        )
        .unwrap();

        let settings = EngineSettings {
            default_initial_capital: 5_000.0,
            ..EngineSettings::default()
        };
        let config = load_config(&path, &settings).unwrap();
        assert_eq!(config.initial_capital, 5_000.0);
    }

    #[test]
    fn store_without_destination_is_rejected() {
        assert!(build_sink(&EngineSettings::default()).is_err());
    }
}
