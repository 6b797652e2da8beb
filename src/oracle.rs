use crate::http_client::{build_async_client, truncate_for_log, MAX_ERROR_BODY_CHARS};
use crate::models::{DaySlice, Decision, DecisionAction, Position};
use crate::strategy::{DecisionBatch, RejectedDecision};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// What an external decision oracle sees for one simulated date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleContext {
    pub strategy: String,
    pub date: NaiveDate,
    pub symbols: Vec<String>,
    pub market_data: DaySlice,
    pub recent_closes: BTreeMap<String, Vec<f64>>,
    pub positions: Vec<Position>,
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// At most one decision per requested symbol. Buys carry a quantity; a sell without one closes the position.
    async fn get_decision(&self, context: &OracleContext) -> Result<Vec<Decision>>;
}

/// Splits raw oracle output into decisions that honour the oracle contract and rejections.
pub fn validate_oracle_decisions(requested: &[String], decisions: Vec<Decision>) -> DecisionBatch {
    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut batch = DecisionBatch::default();

    for decision in decisions {
        let reason = if !requested.contains(decision.symbol.as_str()) {
            Some("decision for a symbol that was not requested".to_string())
        } else if !seen.insert(decision.symbol.clone()) {
            Some("duplicate decision for symbol".to_string())
        } else {
            quantity_violation(&decision)
        };

        match reason {
            Some(reason) => batch.rejected.push(RejectedDecision {
                symbol: decision.symbol,
                action: Some(decision.action),
                reason,
            }),
            None => batch.decisions.push(decision),
        }
    }

    batch
}

/// Buys need a positive quantity. A sell may omit it to close the whole holding.
fn quantity_violation(decision: &Decision) -> Option<String> {
    let positive = |quantity: f64| quantity.is_finite() && quantity > 0.0;
    match (decision.action, decision.quantity) {
        (DecisionAction::Hold, _) | (DecisionAction::Sell, None) => None,
        (_, Some(quantity)) if positive(quantity) => None,
        (action, Some(quantity)) => Some(format!(
            "{} decision with a non-positive quantity ({})",
            action.as_str(),
            quantity
        )),
        (action, None) => Some(format!("{} decision without a quantity", action.as_str())),
    }
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    decisions: Vec<Decision>,
}

/// Oracle reached over HTTP: the context is POSTed as JSON and `{ "decisions": [...] }` is expected back.
pub struct HttpDecisionOracle {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl HttpDecisionOracle {
    pub fn new(url: &str, secret: Option<String>, timeout: Duration) -> Result<Self> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(anyhow!("decision oracle URL cannot be empty"));
        }
        Ok(Self {
            client: build_async_client(Some(timeout))?,
            url,
            secret,
        })
    }
}

#[async_trait]
impl DecisionOracle for HttpDecisionOracle {
    async fn get_decision(&self, context: &OracleContext) -> Result<Vec<Decision>> {
        let mut request = self.client.post(&self.url).json(context);
        if let Some(secret) = self.secret.as_deref() {
            request = request.header("x-oracle-secret", secret);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("decision oracle request to {} failed", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "decision oracle returned status={} for {}: {}",
                status,
                context.date,
                truncate_for_log(&body, MAX_ERROR_BODY_CHARS)
            ));
        }

        let payload: OracleResponse = response
            .json()
            .await
            .context("decision oracle returned an unreadable payload")?;
        Ok(payload.decisions)
    }
}
