use super::{buy_decision, hold_decision, sell_decision, DEFAULT_UNIT_QUANTITY};
use crate::indicators::{moving_average, standard_deviation, z_score};
use crate::models::Decision;
use crate::param_utils::{require_period, require_positive};
use std::collections::HashMap;

pub const TEMPLATE_ID: &str = "mean_reversion";

#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversionParams {
    pub period: usize,
    pub deviation_threshold: f64,
    pub quantity: f64,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            period: 20,
            deviation_threshold: 2.0,
            quantity: DEFAULT_UNIT_QUANTITY,
        }
    }
}

impl MeanReversionParams {
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            period: require_period(parameters, "period", defaults.period)?,
            deviation_threshold: require_positive(
                parameters,
                "deviationThreshold",
                defaults.deviation_threshold,
            )?,
            quantity: require_positive(parameters, "quantity", defaults.quantity)?,
        })
    }
}

pub fn decide(params: &MeanReversionParams, symbol: &str, closes: &[f64]) -> Decision {
    let (Some(&price), Some(&mean), Some(&std_dev)) = (
        closes.last(),
        moving_average(closes, params.period).last(),
        standard_deviation(closes, params.period).last(),
    ) else {
        return hold_decision(symbol, None, format!("waiting for {} closes", params.period));
    };

    let Some(z) = z_score(price, mean, std_dev) else {
        return hold_decision(symbol, None, "no price dispersion in window".to_string());
    };

    if z < -params.deviation_threshold {
        return buy_decision(
            symbol,
            params.quantity,
            z,
            format!(
                "z-score {:.2} below -{:.2} (price {:.2}, mean {:.2})",
                z, params.deviation_threshold, price, mean
            ),
        );
    }

    if z > params.deviation_threshold {
        return sell_decision(
            symbol,
            params.quantity,
            z,
            format!(
                "z-score {:.2} above {:.2} (price {:.2}, mean {:.2})",
                z, params.deviation_threshold, price, mean
            ),
        );
    }

    hold_decision(symbol, Some(z), format!("z-score {:.2} within band", z))
}
