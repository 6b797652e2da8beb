use super::{build_engine, load_config, progress_bar};
use crate::comparator::{compare, ComparisonSummary};
use crate::config::EngineSettings;
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use log::info;
use std::path::{Path, PathBuf};

pub async fn run(
    settings: &EngineSettings,
    config_paths: &[PathBuf],
    data_path: &Path,
    csv_path: Option<&Path>,
) -> Result<()> {
    let configs = config_paths
        .iter()
        .map(|path| load_config(path, settings))
        .collect::<Result<Vec<_>>>()?;
    let engine = build_engine(settings, data_path, false)?;

    info!("Comparing {} backtests", configs.len());
    let pb = progress_bar(configs.len() as u64)?;
    let mut in_flight: FuturesUnordered<_> = configs
        .into_iter()
        .enumerate()
        .map(|(index, config)| {
            let engine = &engine;
            async move { (index, engine.run(config).await) }
        })
        .collect();

    // Completion order varies; results keep the order configs were given in.
    let mut results = Vec::with_capacity(in_flight.len());
    while let Some((index, outcome)) = in_flight.next().await {
        pb.inc(1);
        results.push((index, outcome?));
    }
    results.sort_by_key(|(index, _)| *index);
    let results: Vec<_> = results.into_iter().map(|(_, result)| result).collect();
    pb.finish_and_clear();

    let summary = compare(&results)?;
    print_summary(&summary);

    if let Some(path) = csv_path {
        summary.export_csv(path)?;
        info!("Comparison written to {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &ComparisonSummary) {
    println!(
        "{:<4} {:<24} {:<16} {:>10} {:>10} {:>10} {:>8} {:>7}",
        "#", "name", "strategy", "return%", "annual%", "maxDD%", "sharpe", "trades"
    );
    for (rank, entry) in summary.ranked_by_total_return().iter().enumerate() {
        let m = &entry.metrics;
        println!(
            "{:<4} {:<24} {:<16} {:>10.2} {:>10.2} {:>10.2} {:>8.3} {:>7}",
            rank + 1,
            entry.name,
            entry.strategy,
            m.total_return * 100.0,
            m.annualized_return * 100.0,
            m.max_drawdown * 100.0,
            m.sharpe_ratio,
            m.total_trades
        );
    }

    let name = |index: usize| summary.entries[index].name.as_str();
    println!();
    println!("Best performer: {}", summary.best().name);
    println!("Worst performer: {}", name(summary.worst_performer));
    println!("Lowest drawdown: {}", name(summary.lowest_drawdown));
    println!("Highest Sharpe: {}", name(summary.highest_sharpe));
}
