use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

/// One reading of every quantity, taken together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub orientation: Orientation,
}

impl RawSample {
    /// First quantity the driver reported as NaN or infinite.
    pub fn first_non_finite(&self) -> Option<(&'static str, f64)> {
        [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("pressure", self.pressure),
            ("pitch", self.orientation.pitch),
            ("roll", self.orientation.roll),
            ("yaw", self.orientation.yaw),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
    }
}

/// Blocking access to the environmental sensor board.
pub trait Sensor: Send + Sync {
    fn read_temperature(&self) -> Result<f64>;
    fn read_humidity(&self) -> Result<f64>;
    fn read_pressure(&self) -> Result<f64>;
    fn read_orientation(&self) -> Result<Orientation>;

    /// Reads every quantity once. Orientation comes from a single read so the
    /// three axes cannot skew against each other.
    fn sample(&self) -> Result<RawSample> {
        Ok(RawSample {
            temperature: self.read_temperature()?,
            humidity: self.read_humidity()?,
            pressure: self.read_pressure()?,
            orientation: self.read_orientation()?,
        })
    }
}

/// Stand-in for the hardware driver on hosts without the sensor board.
///
/// Returns fixed baselines for the environmental quantities and slowly turns
/// the yaw so charts have something to show.
pub struct SimulatedSensor {
    baseline: RawSample,
    yaw_step_degrees: f64,
    reads: AtomicU64,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self {
            baseline: RawSample {
                temperature: 24.0,
                humidity: 40.0,
                pressure: 1013.25,
                orientation: Orientation {
                    pitch: 1.5,
                    roll: 358.7,
                    yaw: 0.0,
                },
            },
            yaw_step_degrees: 0.5,
            reads: AtomicU64::new(0),
        }
    }

    pub fn with_baseline(baseline: RawSample) -> Self {
        Self {
            baseline,
            ..Self::new()
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for SimulatedSensor {
    fn read_temperature(&self) -> Result<f64> {
        Ok(self.baseline.temperature)
    }

    fn read_humidity(&self) -> Result<f64> {
        Ok(self.baseline.humidity)
    }

    fn read_pressure(&self) -> Result<f64> {
        Ok(self.baseline.pressure)
    }

    fn read_orientation(&self) -> Result<Orientation> {
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        let yaw = (self.baseline.orientation.yaw + n as f64 * self.yaw_step_degrees) % 360.0;
        Ok(Orientation {
            yaw,
            ..self.baseline.orientation
        })
    }
}
