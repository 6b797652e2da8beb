use crate::error::LedgerError;
use crate::models::{PortfolioState, Position, Trade};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// Sells within this distance of the full holding close the position exactly.
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Cash and positions of a single backtest run.
///
/// All mutation goes through [`Ledger::buy`] and [`Ledger::sell`]; a rejected order
/// leaves the state untouched.
#[derive(Debug, Clone)]
pub struct Ledger {
    state: PortfolioState,
}

impl Ledger {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            state: PortfolioState::new(initial_cash),
        }
    }

    pub fn from_state(state: PortfolioState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn into_state(self) -> PortfolioState {
        self.state
    }

    pub fn cash(&self) -> f64 {
        self.state.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.state.position(symbol)
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.state.positions
    }

    pub fn buy(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        date: NaiveDate,
    ) -> Result<Trade, LedgerError> {
        validate_order(symbol, quantity, price)?;

        let cost = quantity * price;
        if cost > self.state.cash {
            return Err(LedgerError::InsufficientFunds {
                symbol: symbol.to_string(),
                required: cost,
                available: self.state.cash,
            });
        }

        self.state.cash -= cost;
        let position = self
            .state
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                quantity: 0.0,
                entry_price: 0.0,
            });
        let total_quantity = position.quantity + quantity;
        position.entry_price = (position.quantity * position.entry_price + cost) / total_quantity;
        position.quantity = total_quantity;

        Ok(Trade::buy(symbol, quantity, price, date, cost))
    }

    pub fn sell(
        &mut self,
        symbol: &str,
        quantity: f64,
        price: f64,
        date: NaiveDate,
    ) -> Result<Trade, LedgerError> {
        validate_order(symbol, quantity, price)?;

        let Some(position) = self.state.positions.get_mut(symbol) else {
            return Err(LedgerError::NoPosition {
                symbol: symbol.to_string(),
            });
        };
        if quantity > position.quantity + QUANTITY_EPSILON {
            return Err(LedgerError::InsufficientShares {
                symbol: symbol.to_string(),
                requested: quantity,
                held: position.quantity,
            });
        }

        let closes_position = quantity >= position.quantity - QUANTITY_EPSILON;
        let quantity = if closes_position {
            position.quantity
        } else {
            quantity
        };
        let proceeds = quantity * price;
        let profit_loss = proceeds - quantity * position.entry_price;

        if closes_position {
            self.state.positions.remove(symbol);
        } else {
            position.quantity -= quantity;
        }
        self.state.cash += proceeds;

        Ok(Trade::sell(symbol, quantity, price, date, proceeds, profit_loss))
    }

    /// Equity at the given prices. Symbols without a price are marked at their entry price.
    pub fn mark_to_market(&self, prices: &HashMap<String, f64>) -> f64 {
        self.state.cash + self.state.positions_value(prices)
    }
}

fn validate_order(symbol: &str, quantity: f64, price: f64) -> Result<(), LedgerError> {
    let reason = if symbol.trim().is_empty() {
        "symbol is blank"
    } else if !quantity.is_finite() || quantity <= 0.0 {
        "quantity must be a positive number"
    } else if !price.is_finite() || price <= 0.0 {
        "price must be a positive number"
    } else {
        return Ok(());
    };

    Err(LedgerError::InvalidOrder {
        symbol: symbol.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeSide;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn buy_then_sell_aapl_scenario() {
        let mut ledger = Ledger::new(100_000.0);

        let buy = ledger.buy("AAPL", 10.0, 150.0, day(1)).unwrap();
        assert_eq!(buy.side, TradeSide::Buy);
        assert!((buy.amount - 1_500.0).abs() < 1e-9);
        assert!((ledger.cash() - 98_500.0).abs() < 1e-9);
        let position = ledger.position("AAPL").unwrap();
        assert!((position.quantity - 10.0).abs() < 1e-9);
        assert!((position.entry_price - 150.0).abs() < 1e-9);

        let sell = ledger.sell("AAPL", 10.0, 160.0, day(2)).unwrap();
        assert!((ledger.cash() - 100_100.0).abs() < 1e-9);
        assert!((sell.profit_loss.unwrap() - 100.0).abs() < 1e-9);
        assert!(ledger.position("AAPL").is_none());
    }

    #[test]
    fn repeated_buys_use_weighted_average_entry() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.buy("MSFT", 10.0, 100.0, day(1)).unwrap();
        ledger.buy("MSFT", 30.0, 120.0, day(2)).unwrap();

        let position = ledger.position("MSFT").unwrap();
        assert!((position.quantity - 40.0).abs() < 1e-9);
        assert!((position.entry_price - 115.0).abs() < 1e-9);
        assert!((ledger.cash() - (10_000.0 - 1_000.0 - 3_600.0)).abs() < 1e-9);
    }

    #[test]
    fn partial_sell_keeps_entry_price() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.buy("MSFT", 10.0, 100.0, day(1)).unwrap();

        let trade = ledger.sell("MSFT", 4.0, 90.0, day(2)).unwrap();
        assert!((trade.profit_loss.unwrap() + 40.0).abs() < 1e-9);

        let position = ledger.position("MSFT").unwrap();
        assert!((position.quantity - 6.0).abs() < 1e-9);
        assert!((position.entry_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn buy_beyond_cash_is_rejected_without_mutation() {
        let mut ledger = Ledger::new(1_000.0);
        let err = ledger.buy("TSLA", 5.0, 250.0, day(1)).unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!((ledger.cash() - 1_000.0).abs() < 1e-9);
        assert!(ledger.positions().is_empty());
    }

    #[test]
    fn buy_using_exactly_all_cash_is_allowed() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.buy("TSLA", 4.0, 250.0, day(1)).unwrap();
        assert_eq!(ledger.cash(), 0.0);
    }

    #[test]
    fn sell_without_position_fails() {
        let mut ledger = Ledger::new(1_000.0);
        let err = ledger.sell("NVDA", 1.0, 10.0, day(1)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::NoPosition {
                symbol: "NVDA".to_string()
            }
        );
    }

    #[test]
    fn sell_more_than_held_fails_and_keeps_position() {
        let mut ledger = Ledger::new(1_000.0);
        ledger.buy("NVDA", 2.0, 10.0, day(1)).unwrap();

        let err = ledger.sell("NVDA", 3.0, 10.0, day(2)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientShares { .. }));
        assert!((ledger.position("NVDA").unwrap().quantity - 2.0).abs() < 1e-9);
        assert!((ledger.cash() - 980.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_quantity_and_price() {
        let mut ledger = Ledger::new(1_000.0);
        assert!(matches!(
            ledger.buy("AAA", 0.0, 10.0, day(1)),
            Err(LedgerError::InvalidOrder { .. })
        ));
        assert!(matches!(
            ledger.buy("AAA", 1.0, -1.0, day(1)),
            Err(LedgerError::InvalidOrder { .. })
        ));
        assert!(matches!(
            ledger.sell("AAA", f64::NAN, 10.0, day(1)),
            Err(LedgerError::InvalidOrder { .. })
        ));
    }

    #[test]
    fn round_trip_at_same_price_restores_cash() {
        let mut ledger = Ledger::new(5_000.0);
        ledger.buy("AMD", 7.0, 123.45, day(1)).unwrap();
        let trade = ledger.sell("AMD", 7.0, 123.45, day(1)).unwrap();

        assert!((ledger.cash() - 5_000.0).abs() < 1e-9);
        assert!(trade.profit_loss.unwrap().abs() < 1e-9);
        assert!(ledger.positions().is_empty());
    }

    #[test]
    fn mark_to_market_uses_prices_and_entry_fallback() {
        let mut ledger = Ledger::new(10_000.0);
        ledger.buy("AAA", 10.0, 50.0, day(1)).unwrap();
        ledger.buy("BBB", 5.0, 100.0, day(1)).unwrap();

        let prices = HashMap::from([("AAA".to_string(), 55.0)]);
        let equity = ledger.mark_to_market(&prices);
        assert!((equity - (9_000.0 + 550.0 + 500.0)).abs() < 1e-9);
        assert!((ledger.cash() - 9_000.0).abs() < 1e-9);
    }
}
