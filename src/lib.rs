mod app;
pub mod cli;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod sensing;
pub mod settings;
mod utils;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

pub use app::{run_collector, run_dashboard, shutdown_on_signal};
use cli::{Cli, Command};
pub use error::{PipelineError, PipelineResult};
use sensing::SimulatedSensor;
use settings::Settings;

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if let Command::InitConfig { path } = &cli.command {
        Settings::default().persist(path)?;
        log::info!("Wrote default settings to {}", path.display());
        return Ok(());
    }

    let settings = cli.settings()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        let cancel_token = CancellationToken::new();
        tokio::spawn(shutdown_on_signal(cancel_token.clone()));

        match cli.command {
            Command::Collect { .. } => {
                log::info!("sensedash collector starting up...");
                run_collector(&settings, Arc::new(SimulatedSensor::new()), cancel_token).await
            }
            Command::Dashboard { .. } => {
                log::info!("sensedash dashboard starting up...");
                run_dashboard(&settings, cancel_token).await
            }
            Command::InitConfig { .. } => Ok(()),
        }
    })
}
