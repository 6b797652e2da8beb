use crate::models::{Bar, BarsBySymbol};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;

/// Source of historical bars for a backtest run.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Bars per requested symbol with `start <= timestamp <= end`, ascending by timestamp.
    /// Symbols without data may be missing from the map.
    async fn get_historical_bars(
        &self,
        symbols: &[String],
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarsBySymbol>;
}

fn select_bars<'a, I>(
    bars: I,
    symbols: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BarsBySymbol
where
    I: IntoIterator<Item = &'a Bar>,
{
    let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
    let mut selected: BarsBySymbol = HashMap::new();
    for bar in bars {
        if wanted.contains(bar.symbol.as_str()) && bar.timestamp >= start && bar.timestamp <= end
        {
            selected
                .entry(bar.symbol.clone())
                .or_default()
                .push(bar.clone());
        }
    }
    for series in selected.values_mut() {
        series.sort_by_key(|bar| bar.timestamp);
    }
    selected
}

/// Provider over bars held in memory. Timeframe is ignored.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    bars: Vec<Bar>,
}

impl InMemoryMarketData {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn from_series(series: BarsBySymbol) -> Self {
        Self {
            bars: series.into_values().flatten().collect(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketData {
    async fn get_historical_bars(
        &self,
        symbols: &[String],
        _timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarsBySymbol> {
        Ok(select_bars(&self.bars, symbols, start, end))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub timeframe: String,
    pub bars: Vec<Bar>,
}

impl MarketDataSnapshot {
    pub fn new(timeframe: &str, bars: Vec<Bar>) -> Self {
        Self {
            version: MARKET_DATA_SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            timeframe: timeframe.to_string(),
            bars,
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| {
            format!("Failed to open market data snapshot at {}", path.display())
        })?;
        let reader = BufReader::new(file);
        let snapshot: MarketDataSnapshot = if is_json(path) {
            serde_json::from_reader(reader).context("Snapshot decode failed")?
        } else {
            bincode::deserialize_from(reader).context("Snapshot decode failed")?
        };

        if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Market data snapshot version mismatch (found {}, expected {})",
                snapshot.version,
                MARKET_DATA_SNAPSHOT_VERSION
            ));
        }
        Ok(snapshot)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create snapshot directory {}", parent.display())
                })?;
            }
        }

        let file = File::create(path).with_context(|| {
            format!(
                "Unable to create market data snapshot at {}",
                path.display()
            )
        })?;
        let mut writer = BufWriter::new(file);
        if is_json(path) {
            serde_json::to_writer(&mut writer, self)
                .context("Failed to serialize market data snapshot")?;
        } else {
            bincode::serialize_into(&mut writer, self)
                .context("Failed to serialize market data snapshot")?;
        }
        writer
            .flush()
            .context("Failed to flush market data snapshot to disk")?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Provider backed by a snapshot file read once at construction.
#[derive(Debug, Clone)]
pub struct SnapshotMarketData {
    snapshot: MarketDataSnapshot,
}

impl SnapshotMarketData {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let snapshot = MarketDataSnapshot::load_from_file(path)?;
        info!(
            "Loaded {} bars ({}) from {}",
            snapshot.bars.len(),
            snapshot.timeframe,
            path.display()
        );
        Ok(Self { snapshot })
    }

    pub fn snapshot(&self) -> &MarketDataSnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl MarketDataProvider for SnapshotMarketData {
    async fn get_historical_bars(
        &self,
        symbols: &[String],
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarsBySymbol> {
        if !self.snapshot.timeframe.eq_ignore_ascii_case(timeframe.trim()) {
            return Err(anyhow!(
                "Snapshot holds {} bars but {} was requested",
                self.snapshot.timeframe,
                timeframe
            ));
        }
        Ok(select_bars(&self.snapshot.bars, symbols, start, end))
    }
}
