use anyhow::Result;
use backtest_engine::commands::{compare, run};
use backtest_engine::config::EngineSettings;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "engine")]
#[command(about = "Day-by-day strategy backtesting over market data snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest and print its metrics
    Run {
        /// Backtest config (JSON)
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        /// Market data snapshot (.json or bincode)
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        /// Persist the result via BACKTEST_API_URL or BACKTEST_RESULTS_DIR
        #[arg(long)]
        store: bool,
    },
    /// Run several backtests over the same data and rank them
    Compare {
        /// Backtest configs (JSON); repeat the flag for each config
        #[arg(long = "config", value_name = "PATH", required = true)]
        configs: Vec<PathBuf>,
        /// Market data snapshot (.json or bincode)
        #[arg(long = "data", value_name = "PATH")]
        data: PathBuf,
        /// Write the comparison table to a CSV file
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = EngineSettings::from_env()?;
    info!("Starting engine. Simulated results only; past performance does not predict future returns.");

    match cli.command {
        Commands::Run {
            config,
            data,
            store,
        } => {
            run::run(&settings, &config, &data, store).await?;
        }
        Commands::Compare { configs, data, csv } => {
            compare::run(&settings, &configs, &data, csv.as_deref()).await?;
        }
    }

    Ok(())
}
