use crate::error::BacktestError;
use crate::models::{DaySlice, Decision, DecisionAction, Position, StrategyConfig};
use crate::oracle::DecisionOracle;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Quantity attached to technical buy/sell decisions unless the `quantity` parameter overrides it.
pub const DEFAULT_UNIT_QUANTITY: f64 = 1.0;

#[path = "strategies/momentum.rs"]
pub mod momentum;

pub use momentum::MomentumParams;

#[path = "strategies/mean_reversion.rs"]
pub mod mean_reversion;

pub use mean_reversion::MeanReversionParams;

#[path = "strategies/trend_following.rs"]
pub mod trend_following;

pub use trend_following::TrendFollowingParams;

#[path = "strategies/llm.rs"]
pub mod llm;

pub use llm::LlmParams;

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    Momentum(MomentumParams),
    MeanReversion(MeanReversionParams),
    TrendFollowing(TrendFollowingParams),
    LlmAssisted(LlmParams),
}

impl StrategyKind {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, BacktestError> {
        let parameters = &config.parameters;
        let parsed = match config.id.trim() {
            momentum::TEMPLATE_ID => {
                MomentumParams::from_parameters(parameters).map(StrategyKind::Momentum)
            }
            mean_reversion::TEMPLATE_ID => {
                MeanReversionParams::from_parameters(parameters).map(StrategyKind::MeanReversion)
            }
            trend_following::TEMPLATE_ID => {
                TrendFollowingParams::from_parameters(parameters).map(StrategyKind::TrendFollowing)
            }
            llm::TEMPLATE_ID => LlmParams::from_parameters(parameters).map(StrategyKind::LlmAssisted),
            "" => Err("strategy id is required".to_string()),
            other => Err(format!("unknown strategy template: {}", other)),
        };
        parsed.map_err(BacktestError::Configuration)
    }

    pub fn template_id(&self) -> &'static str {
        match self {
            StrategyKind::Momentum(_) => momentum::TEMPLATE_ID,
            StrategyKind::MeanReversion(_) => mean_reversion::TEMPLATE_ID,
            StrategyKind::TrendFollowing(_) => trend_following::TEMPLATE_ID,
            StrategyKind::LlmAssisted(_) => llm::TEMPLATE_ID,
        }
    }

    pub fn requires_oracle(&self) -> bool {
        matches!(self, StrategyKind::LlmAssisted(_))
    }
}

/// Inputs handed to a decision source for one simulated date.
pub struct DecisionContext<'a> {
    pub date: NaiveDate,
    /// Every symbol of the run, including those without a bar on `date`.
    pub symbols: &'a [String],
    pub bars: &'a DaySlice,
    /// Closing prices per symbol from the first simulated date through `date`.
    pub closes: &'a HashMap<String, Vec<f64>>,
    pub positions: &'a BTreeMap<String, Position>,
}

impl DecisionContext<'_> {
    fn closes_for(&self, symbol: &str) -> &[f64] {
        self.closes.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionBatch {
    pub decisions: Vec<Decision>,
    pub rejected: Vec<RejectedDecision>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedDecision {
    pub symbol: String,
    pub action: Option<DecisionAction>,
    pub reason: String,
}

pub struct DecisionSource {
    kind: StrategyKind,
    oracle: Option<Arc<dyn DecisionOracle>>,
}

impl DecisionSource {
    pub fn new(
        kind: StrategyKind,
        oracle: Option<Arc<dyn DecisionOracle>>,
    ) -> Result<Self, BacktestError> {
        if kind.requires_oracle() && oracle.is_none() {
            return Err(BacktestError::Configuration(format!(
                "strategy '{}' requires a decision oracle",
                kind.template_id()
            )));
        }
        Ok(Self { kind, oracle })
    }

    pub fn kind(&self) -> &StrategyKind {
        &self.kind
    }

    pub async fn decide(&self, context: &DecisionContext<'_>) -> Result<DecisionBatch> {
        match &self.kind {
            StrategyKind::Momentum(params) => Ok(per_symbol(context, |symbol, closes| {
                momentum::decide(params, symbol, closes)
            })),
            StrategyKind::MeanReversion(params) => Ok(per_symbol(context, |symbol, closes| {
                mean_reversion::decide(params, symbol, closes)
            })),
            StrategyKind::TrendFollowing(params) => Ok(per_symbol(context, |symbol, closes| {
                trend_following::decide(params, symbol, closes)
            })),
            StrategyKind::LlmAssisted(params) => {
                let oracle = self
                    .oracle
                    .as_deref()
                    .ok_or_else(|| anyhow!("decision oracle is not configured"))?;
                llm::decide(params, oracle, context).await
            }
        }
    }
}

fn per_symbol<F>(context: &DecisionContext<'_>, mut rule: F) -> DecisionBatch
where
    F: FnMut(&str, &[f64]) -> Decision,
{
    DecisionBatch {
        decisions: context
            .bars
            .keys()
            .map(|symbol| rule(symbol, context.closes_for(symbol)))
            .collect(),
        rejected: Vec::new(),
    }
}

pub fn hold_decision(symbol: &str, indicator_value: Option<f64>, reasoning: String) -> Decision {
    Decision {
        symbol: symbol.to_string(),
        action: DecisionAction::Hold,
        quantity: None,
        reasoning: Some(reasoning),
        indicator_value,
    }
}

pub fn buy_decision(symbol: &str, quantity: f64, indicator_value: f64, reasoning: String) -> Decision {
    Decision {
        symbol: symbol.to_string(),
        action: DecisionAction::Buy,
        quantity: Some(quantity),
        reasoning: Some(reasoning),
        indicator_value: Some(indicator_value),
    }
}

pub fn sell_decision(
    symbol: &str,
    quantity: f64,
    indicator_value: f64,
    reasoning: String,
) -> Decision {
    Decision {
        symbol: symbol.to_string(),
        action: DecisionAction::Sell,
        quantity: Some(quantity),
        reasoning: Some(reasoning),
        indicator_value: Some(indicator_value),
    }
}
