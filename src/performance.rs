use crate::models::*;
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.0;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Metrics for a finished run. Zero trades or an empty equity curve yield all zeros.
    pub fn calculate(trades: &[Trade], daily_equity: &[DailyEquitySample]) -> PerformanceMetrics {
        if trades.is_empty() || daily_equity.is_empty() {
            return PerformanceMetrics::default();
        }

        let total_return = Self::total_return(daily_equity);
        PerformanceMetrics {
            total_return,
            annualized_return: Self::annualized_return(total_return, daily_equity),
            max_drawdown: Self::max_drawdown(daily_equity),
            sharpe_ratio: Self::sharpe_ratio(daily_equity),
            win_rate: Self::win_rate(trades),
            total_trades: trades.len(),
        }
    }

    pub fn total_return(daily_equity: &[DailyEquitySample]) -> f64 {
        let (Some(first), Some(last)) = (daily_equity.first(), daily_equity.last()) else {
            return 0.0;
        };
        if first.equity <= 0.0 {
            return 0.0;
        }
        finite_or_zero((last.equity - first.equity) / first.equity)
    }

    /// Compounds `total_return` over the sampled span. A span shorter than a day
    /// leaves the return unannualized.
    pub fn annualized_return(total_return: f64, daily_equity: &[DailyEquitySample]) -> f64 {
        let (Some(first), Some(last)) = (daily_equity.first(), daily_equity.last()) else {
            return 0.0;
        };
        let year_fraction = (last.date - first.date).num_days() as f64 / DAYS_PER_YEAR;
        if year_fraction <= 0.0 {
            return finite_or_zero(total_return);
        }
        finite_or_zero((1.0 + total_return).powf(1.0 / year_fraction) - 1.0)
    }

    /// Largest fractional decline from a running peak.
    pub fn max_drawdown(daily_equity: &[DailyEquitySample]) -> f64 {
        let Some(first) = daily_equity.first() else {
            return 0.0;
        };

        let mut peak = first.equity;
        let mut max_drawdown = 0.0;
        for sample in daily_equity {
            if sample.equity > peak {
                peak = sample.equity;
            } else if peak > 0.0 {
                let drawdown = (peak - sample.equity) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        finite_or_zero(max_drawdown)
    }

    pub fn daily_returns(daily_equity: &[DailyEquitySample]) -> Vec<f64> {
        daily_equity
            .windows(2)
            .map(|window| {
                let prev_value = window[0].equity;
                let curr_value = window[1].equity;
                if prev_value > 0.0 {
                    (curr_value - prev_value) / prev_value
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Annualized mean/volatility of daily returns, no risk-free adjustment.
    pub fn sharpe_ratio(daily_equity: &[DailyEquitySample]) -> f64 {
        let returns = Self::daily_returns(daily_equity);
        if returns.is_empty() {
            return 0.0;
        }

        let mean_return = returns.iter().mean();
        let std_dev = returns.iter().population_std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        finite_or_zero(mean_return / std_dev * TRADING_DAYS_PER_YEAR.sqrt())
    }

    /// Profitable sells over every trade, buys included in the denominator.
    pub fn win_rate(trades: &[Trade]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        let winning_sells = trades
            .iter()
            .filter(|trade| trade.side == TradeSide::Sell)
            .filter(|trade| trade.profit_loss.map(|pnl| pnl > 0.0).unwrap_or(false))
            .count();
        winning_sells as f64 / trades.len() as f64
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
