//! Moving-average crossover. Acts only on the bar where the short average changes side
//! relative to the long one; staying above or below is a hold.

use super::{buy_decision, hold_decision, sell_decision, DEFAULT_UNIT_QUANTITY};
use crate::indicators::{crossed_above, crossed_below, moving_average};
use crate::models::Decision;
use crate::param_utils::{require_period, require_positive};
use std::collections::HashMap;

pub const TEMPLATE_ID: &str = "trend_following";

#[derive(Debug, Clone, PartialEq)]
pub struct TrendFollowingParams {
    pub short_period: usize,
    pub long_period: usize,
    pub quantity: f64,
}

impl Default for TrendFollowingParams {
    fn default() -> Self {
        Self {
            short_period: 10,
            long_period: 30,
            quantity: DEFAULT_UNIT_QUANTITY,
        }
    }
}

impl TrendFollowingParams {
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self, String> {
        let defaults = Self::default();
        let short_period = require_period(parameters, "shortPeriod", defaults.short_period)?;
        let long_period = require_period(parameters, "longPeriod", defaults.long_period)?;
        if short_period >= long_period {
            return Err(format!(
                "shortPeriod ({}) must be below longPeriod ({})",
                short_period, long_period
            ));
        }
        Ok(Self {
            short_period,
            long_period,
            quantity: require_positive(parameters, "quantity", defaults.quantity)?,
        })
    }
}

fn last_two(values: &[f64]) -> Option<(f64, f64)> {
    match values {
        [.., previous, current] => Some((*previous, *current)),
        _ => None,
    }
}

pub fn decide(params: &TrendFollowingParams, symbol: &str, closes: &[f64]) -> Decision {
    let short = moving_average(closes, params.short_period);
    let long = moving_average(closes, params.long_period);
    let (Some((prev_short, short_now)), Some((prev_long, long_now))) =
        (last_two(&short), last_two(&long))
    else {
        return hold_decision(
            symbol,
            None,
            format!("waiting for {} closes", params.long_period + 1),
        );
    };

    let spread = short_now - long_now;
    if crossed_above(prev_short, prev_long, short_now, long_now) {
        return buy_decision(
            symbol,
            params.quantity,
            spread,
            format!(
                "short MA {:.2} crossed above long MA {:.2}",
                short_now, long_now
            ),
        );
    }
    if crossed_below(prev_short, prev_long, short_now, long_now) {
        return sell_decision(
            symbol,
            params.quantity,
            spread,
            format!(
                "short MA {:.2} crossed below long MA {:.2}",
                short_now, long_now
            ),
        );
    }

    hold_decision(symbol, Some(spread), "no moving-average crossover".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionAction;

    fn params() -> TrendFollowingParams {
        TrendFollowingParams {
            short_period: 2,
            long_period: 3,
            quantity: 1.0,
        }
    }

    #[test]
    fn buys_only_on_the_crossing_bar() {
        // short MA: [10, 9.5, 10.5]; long MA: [9.67, 10.33] -> below, then above
        let closes = [10.0, 10.0, 9.0, 12.0];
        let crossing = decide(&params(), "AAA", &closes);
        assert_eq!(crossing.action, DecisionAction::Buy);

        // short stays above long on the following bar
        let after = decide(&params(), "AAA", &[10.0, 10.0, 9.0, 12.0, 13.0]);
        assert_eq!(after.action, DecisionAction::Hold);
        assert!(after.indicator_value.unwrap() > 0.0);
    }

    #[test]
    fn sells_only_on_the_downward_crossing() {
        let crossing = decide(&params(), "AAA", &[10.0, 10.0, 11.0, 8.0]);
        assert_eq!(crossing.action, DecisionAction::Sell);

        let after = decide(&params(), "AAA", &[10.0, 10.0, 11.0, 8.0, 7.0]);
        assert_eq!(after.action, DecisionAction::Hold);
    }

    #[test]
    fn needs_two_long_averages() {
        let decision = decide(&params(), "AAA", &[1.0, 2.0, 3.0]);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.indicator_value.is_none());
    }

    #[test]
    fn short_period_must_be_shorter() {
        let parameters = HashMap::from([
            ("shortPeriod".to_string(), 30.0),
            ("longPeriod".to_string(), 10.0),
        ]);
        assert!(TrendFollowingParams::from_parameters(&parameters).is_err());
    }
}
