//! Ranks completed backtests against each other.
//!
//! Every "best" pick uses a strict comparison, so on ties the earliest result wins.

use crate::error::ComparatorError;
use crate::models::{BacktestResult, PerformanceMetrics};
use anyhow::{Context, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonEntry {
    pub name: String,
    pub strategy: String,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSummary {
    pub entries: Vec<ComparisonEntry>,
    /// Indices into `entries`.
    pub best_performer: usize,
    pub worst_performer: usize,
    pub lowest_drawdown: usize,
    pub highest_sharpe: usize,
}

/// One exported comparison row; floats are fixed to six decimals.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    name: &'a str,
    strategy: &'a str,
    total_return: String,
    annualized_return: String,
    max_drawdown: String,
    sharpe_ratio: String,
    win_rate: String,
    total_trades: usize,
}

impl<'a> From<&'a ComparisonEntry> for CsvRow<'a> {
    fn from(entry: &'a ComparisonEntry) -> Self {
        let m = &entry.metrics;
        Self {
            name: &entry.name,
            strategy: &entry.strategy,
            total_return: format!("{:.6}", m.total_return),
            annualized_return: format!("{:.6}", m.annualized_return),
            max_drawdown: format!("{:.6}", m.max_drawdown),
            sharpe_ratio: format!("{:.6}", m.sharpe_ratio),
            win_rate: format!("{:.6}", m.win_rate),
            total_trades: m.total_trades,
        }
    }
}

/// Indices chosen from a list of metrics, in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricLeaders {
    pub best_performer: usize,
    pub worst_performer: usize,
    pub lowest_drawdown: usize,
    pub highest_sharpe: usize,
}

fn first_strict_by<F>(metrics: &[PerformanceMetrics], replaces: F) -> usize
where
    F: Fn(&PerformanceMetrics, &PerformanceMetrics) -> bool,
{
    let mut chosen = 0;
    for (index, candidate) in metrics.iter().enumerate().skip(1) {
        if replaces(candidate, &metrics[chosen]) {
            chosen = index;
        }
    }
    chosen
}

pub fn compare_metrics(metrics: &[PerformanceMetrics]) -> Result<MetricLeaders, ComparatorError> {
    if metrics.is_empty() {
        return Err(ComparatorError::EmptyInput);
    }

    Ok(MetricLeaders {
        best_performer: first_strict_by(metrics, |c, best| c.total_return > best.total_return),
        worst_performer: first_strict_by(metrics, |c, worst| c.total_return < worst.total_return),
        lowest_drawdown: first_strict_by(metrics, |c, low| c.max_drawdown < low.max_drawdown),
        highest_sharpe: first_strict_by(metrics, |c, high| c.sharpe_ratio > high.sharpe_ratio),
    })
}

pub fn compare(results: &[BacktestResult]) -> Result<ComparisonSummary, ComparatorError> {
    let metrics: Vec<PerformanceMetrics> = results.iter().map(|r| r.metrics.clone()).collect();
    let leaders = compare_metrics(&metrics)?;

    let entries = results
        .iter()
        .map(|result| ComparisonEntry {
            name: result.config.name.clone(),
            strategy: result.config.strategy.id.clone(),
            metrics: result.metrics.clone(),
        })
        .collect();

    Ok(ComparisonSummary {
        entries,
        best_performer: leaders.best_performer,
        worst_performer: leaders.worst_performer,
        lowest_drawdown: leaders.lowest_drawdown,
        highest_sharpe: leaders.highest_sharpe,
    })
}

impl ComparisonSummary {
    pub fn best(&self) -> &ComparisonEntry {
        &self.entries[self.best_performer]
    }

    /// Entries by descending total return; equal returns keep input order.
    pub fn ranked_by_total_return(&self) -> Vec<&ComparisonEntry> {
        let mut ranked: Vec<&ComparisonEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| {
            b.metrics
                .total_return
                .partial_cmp(&a.metrics.total_return)
                .unwrap_or(Ordering::Equal)
        });
        ranked
    }

    /// Export results to CSV
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file {}", path.display()))?;

        for entry in &self.entries {
            wtr.serialize(CsvRow::from(entry))?;
        }

        wtr.flush().context("Failed to flush CSV file")?;
        Ok(())
    }
}
