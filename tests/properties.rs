use backtest_engine::error::LedgerError;
use backtest_engine::indicators::rsi;
use backtest_engine::ledger::Ledger;
use backtest_engine::models::{Bar, BarsBySymbol};
use backtest_engine::walker::{closing_prices, TimeSeriesWalker};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

const SYMBOLS: [&str; 4] = ["AAPL", "MSFT", "NVDA", "SPY"];

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

fn random_bars(rng: &mut StdRng) -> BarsBySymbol {
    let origin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut bars = BarsBySymbol::new();
    for symbol in SYMBOLS {
        let mut series = Vec::new();
        let mut price = rng.gen_range(20.0..500.0);
        let mut minutes = 0i64;
        for _ in 0..rng.gen_range(0..60) {
            minutes += rng.gen_range(30..3_000);
            price = f64::max(1.0, price * (1.0 + rng.gen_range(-0.05..0.05)));
            series.push(Bar {
                symbol: symbol.to_string(),
                timestamp: origin + Duration::minutes(minutes),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: rng.gen_range(100.0..10_000.0),
            });
        }
        bars.insert(symbol.to_string(), series);
    }
    bars
}

#[test]
fn ledger_never_overdraws_and_marks_consistently() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let mut ledger = Ledger::new(rng.gen_range(100.0..50_000.0));
        let mut prices: HashMap<String, f64> = HashMap::new();

        for step in 0..200 {
            let symbol = SYMBOLS[rng.gen_range(0..SYMBOLS.len())];
            let price = rng.gen_range(1.0..400.0);
            let quantity = rng.gen_range(1..25) as f64;
            prices.insert(symbol.to_string(), price);

            let outcome = if rng.gen_bool(0.55) {
                ledger.buy(symbol, quantity, price, day(step))
            } else {
                ledger.sell(symbol, quantity, price, day(step))
            };
            if let Err(err) = outcome {
                assert!(matches!(
                    err,
                    LedgerError::InsufficientFunds { .. }
                        | LedgerError::NoPosition { .. }
                        | LedgerError::InsufficientShares { .. }
                ));
            }

            assert!(ledger.cash() >= 0.0);
            assert!(ledger.positions().values().all(|p| p.quantity > 0.0));

            let expected: f64 = ledger.cash()
                + ledger
                    .positions()
                    .values()
                    .map(|p| p.quantity * prices.get(&p.symbol).copied().unwrap_or(p.entry_price))
                    .sum::<f64>();
            assert!((ledger.mark_to_market(&prices) - expected).abs() < 1e-6);
        }
    }
}

#[test]
fn walker_dates_are_ordered_and_match_day_slices() {
    let mut rng = StdRng::seed_from_u64(42);
    let walker = TimeSeriesWalker::new();
    for _ in 0..25 {
        let bars = random_bars(&mut rng);
        let dates = walker.extract_dates(&bars);
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));

        let days = walker.group_by_day(&bars);
        assert_eq!(days.keys().copied().collect::<Vec<_>>(), dates);

        let total: usize = bars.values().map(Vec::len).sum();
        let grouped: usize = days.values().flat_map(|slice| slice.values()).map(Vec::len).sum();
        assert_eq!(total, grouped);

        for (date, slice) in &days {
            assert_eq!(slice, &walker.slice_for_date(&bars, *date));
            let prices = closing_prices(slice);
            for (symbol, day_bars) in slice {
                let latest = day_bars.iter().max_by_key(|bar| bar.timestamp).unwrap();
                assert_eq!(prices[symbol], latest.close);
            }
        }
    }
}

#[test]
fn rsi_stays_within_bounds() {
    let mut rng = StdRng::seed_from_u64(1234);
    for _ in 0..100 {
        let period = rng.gen_range(1..30);
        let mut price = 100.0;
        let prices: Vec<f64> = (0..rng.gen_range(0..120))
            .map(|_| {
                price = f64::max(0.5, price + rng.gen_range(-5.0..5.0));
                price
            })
            .collect();

        let values = rsi(&prices, period);
        assert_eq!(values.len(), prices.len().saturating_sub(period));
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
    }
}

#[test]
fn buy_then_sell_restores_cash_plus_profit() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..100 {
        let initial = 1_000_000.0;
        let mut ledger = Ledger::new(initial);
        let quantity = rng.gen_range(1..100) as f64;
        let entry = rng.gen_range(1.0..500.0);
        let exit = rng.gen_range(1.0..500.0);

        ledger.buy("AAPL", quantity, entry, day(0)).unwrap();
        let trade = ledger.sell("AAPL", quantity, exit, day(1)).unwrap();

        let profit = trade.profit_loss.unwrap();
        assert!((profit - quantity * (exit - entry)).abs() < 1e-6);
        assert!((ledger.cash() - (initial + profit)).abs() < 1e-6);
        assert!(ledger.position("AAPL").is_none());
    }
}

#[test]
fn aapl_round_trip_scenario() {
    let mut ledger = Ledger::new(100_000.0);

    ledger.buy("AAPL", 10.0, 150.0, day(0)).unwrap();
    assert_eq!(ledger.cash(), 98_500.0);
    let position = ledger.position("AAPL").unwrap();
    assert_eq!(position.quantity, 10.0);
    assert_eq!(position.entry_price, 150.0);

    let trade = ledger.sell("AAPL", 10.0, 160.0, day(1)).unwrap();
    assert_eq!(ledger.cash(), 100_100.0);
    assert_eq!(trade.profit_loss, Some(100.0));
    assert!(ledger.position("AAPL").is_none());
}
