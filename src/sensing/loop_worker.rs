use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::anyhow;
use rand::{rngs::StdRng, SeedableRng};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{ReadingStore, SensorReading},
    error::{PipelineError, PipelineResult},
    settings::SamplerSettings,
    utils::Backoff,
};

use super::{perturbation::Perturbation, sensor::RawSample, sensor::Sensor};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Marks a blocking sensor read as running; cleared when the read returns,
/// whether or not anyone is still waiting for it.
struct ReadInFlight(Arc<AtomicBool>);

impl Drop for ReadInFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One read-perturb-append step. Owns its randomness so a seeded sampler
/// produces the same readings on every run.
pub struct Sampler {
    sensor: Arc<dyn Sensor>,
    store: Arc<dyn ReadingStore>,
    perturbation: Perturbation,
    rng: StdRng,
    sensor_timeout: Duration,
    store_timeout: Duration,
    schema_ready: bool,
    read_in_flight: Arc<AtomicBool>,
}

impl Sampler {
    pub fn new(
        sensor: Arc<dyn Sensor>,
        store: Arc<dyn ReadingStore>,
        settings: &SamplerSettings,
        store_timeout: Duration,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            sensor,
            store,
            perturbation: settings.perturbation,
            rng,
            sensor_timeout: settings.sensor_timeout(),
            store_timeout,
            schema_ready: false,
            read_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reads the sensor, perturbs the values and commits one row.
    ///
    /// The schema is (re)created first whenever it has not been confirmed yet,
    /// so a store that is unreachable at startup is picked up later.
    pub async fn run_cycle(&mut self) -> PipelineResult<SensorReading> {
        if !self.schema_ready {
            tokio::time::timeout(self.store_timeout, self.store.ensure_schema())
                .await
                .map_err(|_| PipelineError::Timeout {
                    operation: "ensure schema",
                    timeout: self.store_timeout,
                })??;
            self.schema_ready = true;
        }

        let raw = self.read_sensor().await?;
        let reading = self.perturbation.apply(&raw, &mut self.rng);

        // The store keeps going after we stop waiting, so an abandoned append
        // may still land.
        let appended = tokio::time::timeout(self.store_timeout, self.store.append(&reading))
            .await
            .map_err(|_| PipelineError::CommitUnknown {
                timeout: self.store_timeout,
            })?;
        match appended {
            Ok(stored) => Ok(stored),
            Err(PipelineError::SchemaMissing) => {
                self.schema_ready = false;
                Err(PipelineError::SchemaMissing)
            }
            Err(err) => Err(err),
        }
    }

    /// Runs `Sensor::sample` on the blocking pool. A read that outlives its
    /// timeout keeps its thread, so no new read starts until it returns.
    async fn read_sensor(&self) -> PipelineResult<RawSample> {
        if self.read_in_flight.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::SensorUnavailable(anyhow!(
                "previous sensor read is still in progress"
            )));
        }
        let in_flight = ReadInFlight(Arc::clone(&self.read_in_flight));

        let sensor = Arc::clone(&self.sensor);
        let read = tokio::task::spawn_blocking(move || {
            let _in_flight = in_flight;
            sensor.sample()
        });

        let raw = match tokio::time::timeout(self.sensor_timeout, read).await {
            Ok(Ok(Ok(raw))) => raw,
            Ok(Ok(Err(err))) => return Err(PipelineError::SensorUnavailable(err)),
            Ok(Err(join_err)) => {
                return Err(PipelineError::SensorUnavailable(anyhow!(
                    "sensor read worker join failed: {join_err}"
                )))
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    operation: "sensor read",
                    timeout: self.sensor_timeout,
                })
            }
        };

        match raw.first_non_finite() {
            Some((quantity, value)) => Err(PipelineError::SensorUnavailable(anyhow!(
                "sensor returned non-finite {quantity} ({value})"
            ))),
            None => Ok(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingStats {
    pub cycles: u64,
    pub committed: u64,
    pub failed: u64,
    /// Appends abandoned on timeout; the row may or may not be stored.
    pub uncertain: u64,
}

/// Runs sampling cycles until `cancel_token` fires.
///
/// After a committed cycle the loop sleeps `interval`, regardless of how long
/// the cycle took. Failed cycles are logged and retried after a backoff delay.
/// Cancellation only interrupts the sleep, never a commit in progress.
pub async fn sampling_loop(
    mut sampler: Sampler,
    interval: Duration,
    max_backoff: Duration,
    cancel_token: CancellationToken,
) -> SamplingStats {
    let mut backoff = Backoff::new(interval, max_backoff);
    let mut stats = SamplingStats::default();

    while !cancel_token.is_cancelled() {
        let cycle_start = Instant::now();
        stats.cycles += 1;

        let delay = match sampler.run_cycle().await {
            Ok(reading) => {
                stats.committed += 1;
                log_info!(
                    "Committed reading {} at {} in {}ms (t={:.2}, h={:.2}, p={:.2})",
                    reading.id,
                    reading.timestamp,
                    cycle_start.elapsed().as_millis(),
                    reading.temperature.unwrap_or(f64::NAN),
                    reading.humidity.unwrap_or(f64::NAN),
                    reading.pressure.unwrap_or(f64::NAN),
                );
                backoff.on_success()
            }
            Err(err) => {
                let delay = backoff.on_failure();
                match &err {
                    PipelineError::SensorUnavailable(_) | PipelineError::Timeout { .. } => {
                        stats.failed += 1;
                        log_warn!(
                            "sampling cycle skipped [{}]: {err} (failures in a row: {}, retry in {}ms)",
                            err.kind(),
                            backoff.consecutive_failures(),
                            delay.as_millis()
                        );
                    }
                    PipelineError::CommitUnknown { .. } => {
                        stats.uncertain += 1;
                        log_warn!(
                            "sampling cycle gave up waiting for the store [{}]: {err} (failures in a row: {}, retry in {}ms)",
                            err.kind(),
                            backoff.consecutive_failures(),
                            delay.as_millis()
                        );
                    }
                    _ => {
                        stats.failed += 1;
                        log_error!(
                            "sampling cycle lost its reading [{}]: {err} (failures in a row: {}, retry in {}ms)",
                            err.kind(),
                            backoff.consecutive_failures(),
                            delay.as_millis()
                        );
                    }
                }
                delay
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!(
        "sampling loop shutting down after {} cycles ({} committed, {} failed, {} unconfirmed)",
        stats.cycles,
        stats.committed,
        stats.failed,
        stats.uncertain
    );
    stats
}
