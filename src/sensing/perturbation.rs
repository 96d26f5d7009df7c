use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::db::NewReading;

use super::sensor::RawSample;

/// Half-widths of the uniform noise added to each environmental quantity.
/// Orientation is never perturbed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Perturbation {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

impl Default for Perturbation {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            humidity: 0.5,
            pressure: 0.2,
        }
    }
}

impl Perturbation {
    pub fn none() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            pressure: 0.0,
        }
    }

    /// Turns a raw sample into a reading ready to append. The store assigns
    /// the timestamp.
    pub fn apply<R: Rng + ?Sized>(&self, raw: &RawSample, rng: &mut R) -> NewReading {
        NewReading {
            timestamp: None,
            temperature: raw.temperature + jitter(rng, self.temperature),
            humidity: raw.humidity + jitter(rng, self.humidity),
            pressure: raw.pressure + jitter(rng, self.pressure),
            pitch: raw.orientation.pitch,
            roll: raw.orientation.roll,
            yaw: raw.orientation.yaw,
        }
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, magnitude: f64) -> f64 {
    if magnitude > 0.0 {
        rng.gen_range(-magnitude..=magnitude)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::sensor::Orientation;
    use rand::{rngs::StdRng, SeedableRng};

    // Absorbs rounding in `raw + noise - raw`.
    const EPS: f64 = 1e-9;

    fn raw() -> RawSample {
        RawSample {
            temperature: 21.0,
            humidity: 45.0,
            pressure: 1009.0,
            orientation: Orientation {
                pitch: 2.0,
                roll: 3.0,
                yaw: 270.0,
            },
        }
    }

    #[test]
    fn noise_stays_within_bounds() {
        let perturbation = Perturbation::default();
        let mut rng = StdRng::seed_from_u64(7);
        let raw = raw();

        for _ in 0..10_000 {
            let reading = perturbation.apply(&raw, &mut rng);
            assert!((reading.temperature - raw.temperature).abs() <= 0.3 + EPS);
            assert!((reading.humidity - raw.humidity).abs() <= 0.5 + EPS);
            assert!((reading.pressure - raw.pressure).abs() <= 0.2 + EPS);
            assert_eq!(reading.pitch, 2.0);
            assert_eq!(reading.roll, 3.0);
            assert_eq!(reading.yaw, 270.0);
            assert!(reading.timestamp.is_none());
        }
    }

    #[test]
    fn noise_actually_varies() {
        let perturbation = Perturbation::default();
        let mut rng = StdRng::seed_from_u64(11);
        let raw = raw();

        let temps: Vec<f64> = (0..50)
            .map(|_| perturbation.apply(&raw, &mut rng).temperature)
            .collect();
        assert!(temps.iter().any(|t| *t > raw.temperature));
        assert!(temps.iter().any(|t| *t < raw.temperature));
    }

    #[test]
    fn same_seed_gives_same_readings() {
        let perturbation = Perturbation::default();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            assert_eq!(perturbation.apply(&raw(), &mut a), perturbation.apply(&raw(), &mut b));
        }
    }

    #[test]
    fn zero_magnitude_passes_values_through() {
        let mut rng = StdRng::seed_from_u64(1);
        let reading = Perturbation::none().apply(&raw(), &mut rng);
        assert_eq!(reading.temperature, 21.0);
        assert_eq!(reading.humidity, 45.0);
        assert_eq!(reading.pressure, 1009.0);
    }
}
