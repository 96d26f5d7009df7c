//! Sensor reading data model.
//!
//! One `sensor_data` row per sampling instant. Rows are immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted reading, as returned by the store.
///
/// Measurement columns are nullable in the schema; the sampler never writes a
/// partial row, but rows inserted by other writers may carry gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub yaw: Option<f64>,
}

/// A reading about to be appended. `timestamp` is assigned by the store
/// when `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl NewReading {
    /// First measurement that is NaN or infinite. SQLite would store such a
    /// value as NULL, which is reserved for failed reads.
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("pressure", self.pressure),
            ("pitch", self.pitch),
            ("roll", self.roll),
            ("yaw", self.yaw),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
    }
}

/// The most recent readings, newest first. Rebuilt on every refresh tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowTable {
    rows: Vec<SensorReading>,
}

impl WindowTable {
    /// Wraps rows that are already ordered newest-first.
    pub fn from_rows(rows: Vec<SensorReading>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[SensorReading] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn newest(&self) -> Option<&SensorReading> {
        self.rows.first()
    }
}
