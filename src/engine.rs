use crate::error::{BacktestError, LedgerError};
use crate::ledger::Ledger;
use crate::market_data::MarketDataProvider;
use crate::models::*;
use crate::oracle::DecisionOracle;
use crate::performance::PerformanceCalculator;
use crate::progress::{ProgressReporter, RunPhase};
use crate::sink::ResultSink;
use crate::strategy::{DecisionContext, DecisionSource, StrategyKind};
use crate::walker::{closing_prices, TimeSeriesWalker};
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, PartialEq)]
enum ExecutionOutcome {
    Executed(Trade),
    Held,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Replays historical bars day by day against one strategy.
///
/// Collaborators are injected; an engine can run any number of backtests and
/// each run owns its own ledger.
pub struct BacktestEngine {
    market_data: Arc<dyn MarketDataProvider>,
    oracle: Option<Arc<dyn DecisionOracle>>,
    sink: Option<Arc<dyn ResultSink>>,
    progress: ProgressReporter,
    cancel: Option<Arc<AtomicBool>>,
    walker: TimeSeriesWalker,
}

impl BacktestEngine {
    pub fn new(market_data: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            market_data,
            oracle: None,
            sink: None,
            progress: ProgressReporter::disabled(),
            cancel: None,
            walker: TimeSeriesWalker::new(),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn DecisionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Checked before each simulated date; setting it aborts the run with `Cancelled`.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_walker(mut self, walker: TimeSeriesWalker) -> Self {
        self.walker = walker;
        self
    }

    pub async fn run(&self, config: BacktestConfig) -> Result<BacktestResult, BacktestError> {
        let run_id = Uuid::new_v4().to_string();
        self.progress.phase(&run_id, RunPhase::Created);

        let outcome = self.run_inner(&run_id, config).await;
        if let Err(err) = &outcome {
            warn!("Backtest {} failed: {}", run_id, err);
            self.progress.phase(&run_id, RunPhase::Failed);
        }
        outcome
    }

    async fn run_inner(
        &self,
        run_id: &str,
        config: BacktestConfig,
    ) -> Result<BacktestResult, BacktestError> {
        let config = validate_config(config)?;
        let kind = StrategyKind::from_config(&config.strategy)?;
        let source = DecisionSource::new(kind, self.oracle.clone())?;
        self.progress.phase(run_id, RunPhase::Validated);

        info!(
            "Starting backtest '{}' ({}) for {} symbols from {} to {}",
            config.name,
            source.kind().template_id(),
            config.symbols.len(),
            config.start_date.format("%Y-%m-%d"),
            config.end_date.format("%Y-%m-%d")
        );

        let bars = self.fetch_bars(&config).await?;
        self.progress.phase(run_id, RunPhase::DataFetched);

        let days = self.walker.group_by_day(&bars);
        let total_days = days.len();
        self.progress.phase(run_id, RunPhase::Simulating);

        let mut ledger = Ledger::new(config.initial_capital);
        let mut close_history: HashMap<String, Vec<f64>> = HashMap::new();
        let mut trades: Vec<Trade> = Vec::new();
        let mut daily_equity: Vec<DailyEquitySample> = Vec::with_capacity(total_days);
        let mut decision_log: Vec<DecisionOutcome> = Vec::new();

        for (index, (date, slice)) in days.iter().enumerate() {
            if self.is_cancelled() {
                info!("Backtest '{}' cancelled before {}", config.name, date);
                return Err(BacktestError::Cancelled { date: *date });
            }

            let prices = closing_prices(slice);
            for (symbol, price) in &prices {
                close_history.entry(symbol.clone()).or_default().push(*price);
            }

            let batch = {
                let context = DecisionContext {
                    date: *date,
                    symbols: &config.symbols,
                    bars: slice,
                    closes: &close_history,
                    positions: ledger.positions(),
                };
                source.decide(&context).await
            }
            .map_err(BacktestError::DecisionSource)?;

            for rejected in batch.rejected {
                warn!(
                    "Rejected decision for {} on {}: {}",
                    rejected.symbol, date, rejected.reason
                );
                decision_log.push(DecisionOutcome {
                    date: *date,
                    symbol: rejected.symbol,
                    action: rejected.action,
                    quantity: None,
                    status: OutcomeStatus::Failed,
                    message: Some(rejected.reason),
                });
            }

            for decision in &batch.decisions {
                let outcome = execute_decision(&mut ledger, *date, decision, &prices);
                let (status, quantity, message) = match outcome {
                    ExecutionOutcome::Held => continue,
                    ExecutionOutcome::Executed(trade) => {
                        let quantity = trade.quantity;
                        trades.push(trade);
                        (OutcomeStatus::Executed, Some(quantity), decision.reasoning.clone())
                    }
                    ExecutionOutcome::Skipped { reason } => {
                        debug!(
                            "Skipped {} {} on {}: {}",
                            decision.action.as_str(),
                            decision.symbol,
                            date,
                            reason
                        );
                        (OutcomeStatus::Skipped, decision.quantity, Some(reason))
                    }
                    ExecutionOutcome::Failed { reason } => {
                        debug!(
                            "Failed {} {} on {}: {}",
                            decision.action.as_str(),
                            decision.symbol,
                            date,
                            reason
                        );
                        (OutcomeStatus::Failed, decision.quantity, Some(reason))
                    }
                };
                decision_log.push(DecisionOutcome {
                    date: *date,
                    symbol: decision.symbol.clone(),
                    action: Some(decision.action),
                    quantity,
                    status,
                    message,
                });
            }

            let positions_value = ledger.state().positions_value(&prices);
            let equity = ledger.mark_to_market(&prices);
            daily_equity.push(DailyEquitySample {
                date: *date,
                equity,
                cash: ledger.cash(),
                positions_value,
            });
            self.progress
                .day(run_id, *date, index, total_days, equity, trades.len());
        }

        let metrics = PerformanceCalculator::calculate(&trades, &daily_equity);
        self.progress.phase(run_id, RunPhase::MetricsComputed);

        info!(
            "Backtest '{}' finished: {} days, {} trades, total return {:.2}%, max drawdown {:.2}%, sharpe {:.2}",
            config.name,
            daily_equity.len(),
            trades.len(),
            metrics.total_return * 100.0,
            metrics.max_drawdown * 100.0,
            metrics.sharpe_ratio
        );

        let result = BacktestResult {
            id: run_id.to_string(),
            config,
            trades,
            daily_equity,
            decision_log,
            metrics,
            final_portfolio: ledger.into_state(),
            created_at: Utc::now(),
        };

        if let Some(sink) = &self.sink {
            match sink.store_backtest_result(&result.config, &result).await {
                Ok(stored) => {
                    info!("Backtest '{}' stored as {}", result.config.name, stored.id);
                    self.progress.phase(run_id, RunPhase::Persisted);
                }
                Err(err) => {
                    warn!(
                        "Failed to store backtest '{}': {:#}",
                        result.config.name, err
                    );
                }
            }
        }

        self.progress.phase(run_id, RunPhase::Completed);
        Ok(result)
    }

    async fn fetch_bars(&self, config: &BacktestConfig) -> Result<BarsBySymbol, BacktestError> {
        let mut bars = self
            .market_data
            .get_historical_bars(
                &config.symbols,
                &config.timeframe,
                config.start_date,
                config.end_date,
            )
            .await
            .map_err(BacktestError::DataFetch)?;

        let requested: HashSet<&str> = config.symbols.iter().map(String::as_str).collect();
        bars.retain(|symbol, series| requested.contains(symbol.as_str()) && !series.is_empty());

        if bars.is_empty() {
            return Err(BacktestError::DataFetch(anyhow!(
                "no {} bars for {} between {} and {}",
                config.timeframe,
                config.symbols.join(","),
                config.start_date,
                config.end_date
            )));
        }

        for symbol in &config.symbols {
            if !bars.contains_key(symbol) {
                warn!("No bars returned for {}; it will not be traded", symbol);
            }
        }
        Ok(bars)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// Checks a config before any I/O and returns it with symbols trimmed,
/// upper-cased and de-duplicated.
pub fn validate_config(mut config: BacktestConfig) -> Result<BacktestConfig, BacktestError> {
    let invalid = |message: String| -> Result<BacktestConfig, BacktestError> {
        Err(BacktestError::Configuration(message))
    };

    config.name = config.name.trim().to_string();
    if config.name.is_empty() {
        return invalid("name is required".to_string());
    }
    if config.strategy.id.trim().is_empty() {
        return invalid("strategy id is required".to_string());
    }

    let mut seen = HashSet::new();
    let mut symbols = Vec::with_capacity(config.symbols.len());
    for raw in &config.symbols {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return invalid("symbols cannot contain blank entries".to_string());
        }
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    }
    if symbols.is_empty() {
        return invalid("at least one symbol is required".to_string());
    }
    config.symbols = symbols;

    if config.start_date >= config.end_date {
        return invalid(format!(
            "start date {} must be before end date {}",
            config.start_date, config.end_date
        ));
    }

    config.timeframe = config.timeframe.trim().to_string();
    if config.timeframe.is_empty() {
        return invalid("timeframe is required".to_string());
    }

    if !config.initial_capital.is_finite() || config.initial_capital <= 0.0 {
        return invalid(format!(
            "initial capital must be a positive amount (value: {})",
            config.initial_capital
        ));
    }

    Ok(config)
}

fn execute_decision(
    ledger: &mut Ledger,
    date: NaiveDate,
    decision: &Decision,
    prices: &HashMap<String, f64>,
) -> ExecutionOutcome {
    if decision.action == DecisionAction::Hold {
        return ExecutionOutcome::Held;
    }
    let Some(&price) = prices.get(&decision.symbol) else {
        return ExecutionOutcome::Skipped {
            reason: format!("no bar for {} on {}", decision.symbol, date),
        };
    };

    let executed = match decision.action {
        DecisionAction::Buy => match decision.quantity {
            Some(quantity) if quantity > 0.0 => ledger.buy(&decision.symbol, quantity, price, date),
            _ => {
                return ExecutionOutcome::Skipped {
                    reason: "buy without a positive quantity".to_string(),
                }
            }
        },
        DecisionAction::Sell => {
            // Omitted quantity sells the whole holding.
            let quantity = decision.quantity.or_else(|| {
                ledger
                    .position(&decision.symbol)
                    .map(|position| position.quantity)
            });
            match quantity {
                Some(quantity) => ledger.sell(&decision.symbol, quantity, price, date),
                None => Err(LedgerError::NoPosition {
                    symbol: decision.symbol.clone(),
                }),
            }
        }
        DecisionAction::Hold => return ExecutionOutcome::Held,
    };

    match executed {
        Ok(trade) => ExecutionOutcome::Executed(trade),
        Err(err) => ExecutionOutcome::Failed {
            reason: err.to_string(),
        },
    }
}
