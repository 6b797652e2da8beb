use crate::http_client::{build_async_client, truncate_for_log, MAX_ERROR_BODY_CHARS};
use crate::models::{BacktestConfig, BacktestResult, StoredBacktest};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Destination for finished backtest results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn store_backtest_result(
        &self,
        config: &BacktestConfig,
        result: &BacktestResult,
    ) -> Result<StoredBacktest>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiStoreResponse {
    success: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    message: Option<String>,
}

/// Stores results through the backtest API (`POST {base}/backtest/store`).
pub struct ApiResultSink {
    client: reqwest::Client,
    base_url: String,
    api_secret: Option<String>,
}

impl ApiResultSink {
    pub fn new(base_url: &str, api_secret: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("backtest API base URL cannot be empty"));
        }
        Ok(Self {
            client: build_async_client(Some(timeout))?,
            base_url,
            api_secret,
        })
    }

    pub fn store_url(&self) -> String {
        format!("{}/backtest/store", self.base_url)
    }
}

#[async_trait]
impl ResultSink for ApiResultSink {
    async fn store_backtest_result(
        &self,
        config: &BacktestConfig,
        result: &BacktestResult,
    ) -> Result<StoredBacktest> {
        let url = self.store_url();
        let request_body = serde_json::json!({
            "name": config.name,
            "strategy": config.strategy,
            "result": result,
            "tool": "rust-cli",
        });

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(secret) = self.api_secret.as_deref() {
            request = request.header("x-backtest-secret", secret);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("API store request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "API store failed: status={} url={} has_secret={} body={}",
                status,
                url,
                self.api_secret.is_some(),
                truncate_for_log(&body, MAX_ERROR_BODY_CHARS)
            ));
        }

        let api_response: ApiStoreResponse = response
            .json()
            .await
            .context("API store returned an unreadable payload")?;
        if !api_response.success {
            return Err(anyhow!(
                "API store returned failure: {}",
                api_response.message.unwrap_or_default()
            ));
        }

        Ok(StoredBacktest {
            id: api_response.id.unwrap_or_else(|| result.id.clone()),
            created_at: api_response.created_at.unwrap_or(result.created_at),
        })
    }
}

/// Writes each result as pretty JSON to `<dir>/<result id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, result_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", result_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn store_backtest_result(
        &self,
        config: &BacktestConfig,
        result: &BacktestResult,
    ) -> Result<StoredBacktest> {
        fs::create_dir_all(&self.dir).await.with_context(|| {
            format!("Failed to create results directory {}", self.dir.display())
        })?;

        let path = self.path_for(&result.id);
        let payload =
            serde_json::to_vec_pretty(result).context("Failed to serialize backtest result")?;
        fs::write(&path, payload)
            .await
            .with_context(|| format!("Failed to write backtest result to {}", path.display()))?;

        info!("Stored backtest '{}' at {}", config.name, path.display());

        Ok(StoredBacktest {
            id: result.id.clone(),
            created_at: result.created_at,
        })
    }
}
