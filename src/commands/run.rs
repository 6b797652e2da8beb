use super::{build_engine, load_config, progress_bar};
use crate::config::EngineSettings;
use crate::models::{BacktestResult, OutcomeStatus};
use crate::progress::{ProgressEvent, ProgressReporter};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

pub async fn run(
    settings: &EngineSettings,
    config_path: &Path,
    data_path: &Path,
    store: bool,
) -> Result<()> {
    let config = load_config(config_path, settings)?;
    let (reporter, mut receiver) = ProgressReporter::channel();
    let engine = build_engine(settings, data_path, store)?.with_progress(reporter);

    let pb = progress_bar(0)?;
    let drawer_pb = pb.clone();
    let drawer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match event {
                ProgressEvent::Phase { phase, .. } => drawer_pb.set_message(phase.to_string()),
                ProgressEvent::Day {
                    date,
                    index,
                    total,
                    equity,
                    trades,
                    ..
                } => {
                    drawer_pb.set_length(total as u64);
                    drawer_pb.set_position(index as u64 + 1);
                    drawer_pb.set_message(format!("{} equity {:.2} trades {}", date, equity, trades));
                }
            }
        }
    });

    let outcome = engine.run(config).await;
    // Dropping the engine closes the progress channel.
    drop(engine);
    drawer.await.context("Progress task failed")?;
    pb.finish_and_clear();

    let result = outcome?;
    print_result(&result);
    info!("Backtest {} complete", result.id);
    Ok(())
}

fn print_result(result: &BacktestResult) {
    let metrics = &result.metrics;
    let skipped = result
        .decision_log
        .iter()
        .filter(|outcome| outcome.status == OutcomeStatus::Skipped)
        .count();

    println!("Backtest: {} ({})", result.config.name, result.config.strategy.id);
    println!("Result id: {}", result.id);
    println!(
        "Period: {} -> {} ({} simulated days)",
        result.config.start_date.format("%Y-%m-%d"),
        result.config.end_date.format("%Y-%m-%d"),
        result.daily_equity.len()
    );
    println!("Initial capital: {:.2}", result.config.initial_capital);
    println!(
        "Final equity: {:.2}",
        result.final_equity().unwrap_or(result.config.initial_capital)
    );
    println!("Total return: {:.2}%", metrics.total_return * 100.0);
    println!("Annualized return: {:.2}%", metrics.annualized_return * 100.0);
    println!("Max drawdown: {:.2}%", metrics.max_drawdown * 100.0);
    println!("Sharpe ratio: {:.3}", metrics.sharpe_ratio);
    println!(
        "Win rate: {:.2}% (profitable sells over all trades)",
        metrics.win_rate * 100.0
    );
    println!("Trades: {}", metrics.total_trades);
    println!(
        "Decisions not executed: {} failed, {} skipped",
        result.failed_decisions().count(),
        skipped
    );
    println!("Open positions: {}", result.final_portfolio.positions.len());
}
