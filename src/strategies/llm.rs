use super::{DecisionBatch, DecisionContext};
use crate::models::DecisionAction;
use crate::oracle::{validate_oracle_decisions, DecisionOracle, OracleContext};
use crate::param_utils::{get_optional_param_f64, require_period};
use anyhow::Result;
use log::debug;
use std::collections::{BTreeMap, HashMap};

pub const TEMPLATE_ID: &str = "llm";

const DEFAULT_HISTORY_LENGTH: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmParams {
    /// Upper bound applied to every oracle buy/sell quantity.
    pub max_quantity: Option<f64>,
    /// Number of trailing closes per symbol sent to the oracle.
    pub history_length: usize,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            max_quantity: None,
            history_length: DEFAULT_HISTORY_LENGTH,
        }
    }
}

impl LlmParams {
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self, String> {
        let max_quantity = get_optional_param_f64(parameters, "maxQuantity");
        if let Some(cap) = max_quantity {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(format!("parameter maxQuantity must be > 0 (value: {})", cap));
            }
        }
        Ok(Self {
            max_quantity,
            history_length: require_period(parameters, "historyLength", DEFAULT_HISTORY_LENGTH)?,
        })
    }
}

fn build_oracle_context(params: &LlmParams, context: &DecisionContext<'_>) -> OracleContext {
    let symbols = context.symbols.to_vec();
    let recent_closes: BTreeMap<String, Vec<f64>> = symbols
        .iter()
        .map(|symbol| {
            let closes = context.closes_for(symbol);
            let start = closes.len().saturating_sub(params.history_length);
            (symbol.clone(), closes[start..].to_vec())
        })
        .collect();

    OracleContext {
        strategy: TEMPLATE_ID.to_string(),
        date: context.date,
        symbols,
        market_data: context.bars.clone(),
        recent_closes,
        positions: context.positions.values().cloned().collect(),
    }
}

pub async fn decide(
    params: &LlmParams,
    oracle: &dyn DecisionOracle,
    context: &DecisionContext<'_>,
) -> Result<DecisionBatch> {
    let oracle_context = build_oracle_context(params, context);
    let raw = oracle.get_decision(&oracle_context).await?;
    let mut batch = validate_oracle_decisions(&oracle_context.symbols, raw);

    if let Some(cap) = params.max_quantity {
        for decision in batch
            .decisions
            .iter_mut()
            .filter(|decision| decision.action != DecisionAction::Hold)
        {
            if let Some(quantity) = decision.quantity.filter(|quantity| *quantity > cap) {
                debug!(
                    "Capping {} {} quantity from {} to {}",
                    decision.action.as_str(),
                    decision.symbol,
                    quantity,
                    cap
                );
                decision.quantity = Some(cap);
            }
        }
    }

    Ok(batch)
}
