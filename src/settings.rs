use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::sensing::Perturbation;

/// Where readings live. SQLite needs both processes on one host; PostgreSQL
/// lets the collector and the dashboard run on different machines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// SQLite database file.
    pub path: PathBuf,
    /// PostgreSQL connection string, either `host=... dbname=... user=...`
    /// or a `postgresql://` URL.
    pub url: Option<String>,
    pub busy_timeout_ms: u64,
    /// Bound on every append/query round trip.
    pub operation_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("iiot_lab.sqlite3"),
            url: None,
            busy_timeout_ms: 5_000,
            operation_timeout_ms: 10_000,
        }
    }
}

impl StoreSettings {
    /// Human-readable target for logs. Never includes a password.
    pub fn describe(&self) -> String {
        match self.backend {
            StoreBackend::Sqlite => format!("SQLite file {}", self.path.display()),
            StoreBackend::Postgres => match self.postgres_config() {
                Ok(config) => crate::db::postgres::describe(&config),
                Err(_) => "PostgreSQL (invalid connection string)".into(),
            },
        }
    }

    pub fn postgres_config(&self) -> Result<tokio_postgres::Config> {
        let url = self
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .context("store.url is required for the postgres backend")?;
        url.parse()
            .context("store.url is not a valid PostgreSQL connection string")
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    pub interval_ms: u64,
    pub sensor_timeout_ms: u64,
    pub max_backoff_ms: u64,
    /// Fixed seed for the perturbation noise; random when absent.
    pub seed: Option<u64>,
    pub perturbation: Perturbation,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            sensor_timeout_ms: 2_000,
            max_backoff_ms: 60_000,
            seed: None,
            perturbation: Perturbation::default(),
        }
    }
}

impl SamplerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub host: String,
    pub port: u16,
    pub refresh_interval_ms: u64,
    pub window_size: usize,
    pub title: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8050,
            refresh_interval_ms: 5_000,
            window_size: 300,
            title: "IIoT Sensor Dashboard".into(),
        }
    }
}

impl DashboardSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub sampler: SamplerSettings,
    pub dashboard: DashboardSettings,
}

impl Settings {
    /// Reads settings from `path`, or defaults when no path is given.
    /// Missing fields fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings in {}", path.display()))?
            }
            None => Settings::default(),
        };
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        match self.store.backend {
            StoreBackend::Sqlite => {
                if self.store.path.as_os_str().is_empty() {
                    bail!("store.path must not be empty");
                }
            }
            StoreBackend::Postgres => {
                self.store.postgres_config()?;
            }
        }
        for (name, value) in [
            ("store.busy_timeout_ms", self.store.busy_timeout_ms),
            ("store.operation_timeout_ms", self.store.operation_timeout_ms),
            ("sampler.interval_ms", self.sampler.interval_ms),
            ("sampler.sensor_timeout_ms", self.sampler.sensor_timeout_ms),
            ("sampler.max_backoff_ms", self.sampler.max_backoff_ms),
            ("dashboard.refresh_interval_ms", self.dashboard.refresh_interval_ms),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.dashboard.window_size == 0 {
            bail!("dashboard.window_size must be at least 1");
        }
        let p = &self.sampler.perturbation;
        for (name, magnitude) in [
            ("temperature", p.temperature),
            ("humidity", p.humidity),
            ("pressure", p.pressure),
        ] {
            if !magnitude.is_finite() || magnitude < 0.0 {
                bail!("sampler.perturbation.{name} must be a finite, non-negative number (got {magnitude})");
            }
        }
        Ok(())
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}
