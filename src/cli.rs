use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::settings::{Settings, StoreBackend};

#[derive(Debug, Parser)]
#[command(
    name = "sensedash",
    version,
    about = "Samples environmental sensors into SQLite or PostgreSQL and charts the latest readings"
)]
pub struct Cli {
    /// JSON settings file; defaults are used for anything it leaves out
    #[arg(long, global = true, env = "SENSEDASH_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database shared by the collector and the dashboard
    #[arg(long, global = true, env = "SENSEDASH_DB", conflicts_with = "store_url")]
    pub db: Option<PathBuf>,

    /// PostgreSQL connection string; selects the postgres backend
    #[arg(long, global = true, env = "SENSEDASH_STORE_URL")]
    pub store_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample the sensor on a fixed interval and append readings to the store
    Collect {
        /// Seed for the perturbation noise
        #[arg(long)]
        seed: Option<u64>,

        /// Milliseconds to sleep between sampling cycles
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Serve the rolling-window dashboard
    Dashboard {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Number of most recent readings to chart
        #[arg(long)]
        window_size: Option<usize>,
    },

    /// Write the default settings to a file
    InitConfig { path: PathBuf },
}

impl Cli {
    /// Settings file values with command-line overrides applied, validated.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;

        if let Some(db) = &self.db {
            settings.store.backend = StoreBackend::Sqlite;
            settings.store.path = db.clone();
        }
        if let Some(url) = &self.store_url {
            settings.store.backend = StoreBackend::Postgres;
            settings.store.url = Some(url.clone());
        }

        match &self.command {
            Command::Collect { seed, interval_ms } => {
                if seed.is_some() {
                    settings.sampler.seed = *seed;
                }
                if let Some(interval_ms) = interval_ms {
                    settings.sampler.interval_ms = *interval_ms;
                }
            }
            Command::Dashboard {
                host,
                port,
                window_size,
            } => {
                if let Some(host) = host {
                    settings.dashboard.host = host.clone();
                }
                if let Some(port) = port {
                    settings.dashboard.port = *port;
                }
                if let Some(window_size) = window_size {
                    settings.dashboard.window_size = *window_size;
                }
            }
            Command::InitConfig { .. } => {}
        }

        settings.validate()?;
        Ok(settings)
    }
}
