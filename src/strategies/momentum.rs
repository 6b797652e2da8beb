use super::{buy_decision, hold_decision, sell_decision, DEFAULT_UNIT_QUANTITY};
use crate::indicators;
use crate::models::Decision;
use crate::param_utils::{require_in_range, require_period, require_positive};
use std::collections::HashMap;

pub const TEMPLATE_ID: &str = "momentum";

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    pub period: usize,
    pub oversold_level: f64,
    pub overbought_level: f64,
    pub quantity: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            period: 14,
            oversold_level: 30.0,
            overbought_level: 70.0,
            quantity: DEFAULT_UNIT_QUANTITY,
        }
    }
}

impl MomentumParams {
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self, String> {
        let defaults = Self::default();
        let period = require_period(parameters, "period", defaults.period)?;
        let oversold_level =
            require_in_range(parameters, "oversoldLevel", defaults.oversold_level, 0.0, 100.0)?;
        let overbought_level = require_in_range(
            parameters,
            "overboughtLevel",
            defaults.overbought_level,
            0.0,
            100.0,
        )?;
        if oversold_level >= overbought_level {
            return Err(format!(
                "oversoldLevel ({}) must be below overboughtLevel ({})",
                oversold_level, overbought_level
            ));
        }
        let quantity = require_positive(parameters, "quantity", defaults.quantity)?;

        Ok(Self {
            period,
            oversold_level,
            overbought_level,
            quantity,
        })
    }
}

pub fn decide(params: &MomentumParams, symbol: &str, closes: &[f64]) -> Decision {
    let Some(current_rsi) = indicators::rsi(closes, params.period).last().copied() else {
        return hold_decision(
            symbol,
            None,
            format!("waiting for {} closes", params.period + 1),
        );
    };

    // Buy signal: RSI is oversold
    if current_rsi <= params.oversold_level {
        return buy_decision(
            symbol,
            params.quantity,
            current_rsi,
            format!(
                "RSI {:.2} at or below oversold level {:.2}",
                current_rsi, params.oversold_level
            ),
        );
    }

    // Sell signal: RSI is overbought
    if current_rsi >= params.overbought_level {
        return sell_decision(
            symbol,
            params.quantity,
            current_rsi,
            format!(
                "RSI {:.2} at or above overbought level {:.2}",
                current_rsi, params.overbought_level
            ),
        );
    }

    hold_decision(
        symbol,
        Some(current_rsi),
        format!("RSI {:.2} within neutral band", current_rsi),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionAction;

    fn params(period: usize) -> MomentumParams {
        MomentumParams {
            period,
            ..MomentumParams::default()
        }
    }

    #[test]
    fn holds_until_enough_history() {
        let decision = decide(&params(3), "AAA", &[1.0, 2.0, 3.0]);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.indicator_value.is_none());
    }

    #[test]
    fn buys_when_oversold_and_sells_when_overbought() {
        let falling = decide(&params(3), "AAA", &[10.0, 9.0, 8.0, 7.0]);
        assert_eq!(falling.action, DecisionAction::Buy);
        assert_eq!(falling.quantity, Some(1.0));

        let rising = decide(&params(3), "AAA", &[7.0, 8.0, 9.0, 10.0]);
        assert_eq!(rising.action, DecisionAction::Sell);
    }

    #[test]
    fn thresholds_are_inclusive() {
        // seed gains [1, 0] / losses [0, 1] give RSI exactly 50
        let at_threshold = MomentumParams {
            period: 2,
            oversold_level: 50.0,
            overbought_level: 80.0,
            quantity: 2.0,
        };
        let decision = decide(&at_threshold, "AAA", &[10.0, 11.0, 10.0]);
        assert_eq!(decision.action, DecisionAction::Buy);
        assert_eq!(decision.quantity, Some(2.0));
    }

    #[test]
    fn neutral_rsi_holds() {
        let decision = decide(&params(2), "AAA", &[10.0, 11.0, 10.0]);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert!((decision.indicator_value.unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_inverted_levels() {
        let parameters = HashMap::from([
            ("oversoldLevel".to_string(), 70.0),
            ("overboughtLevel".to_string(), 30.0),
        ]);
        assert!(MomentumParams::from_parameters(&parameters).is_err());
    }
}
