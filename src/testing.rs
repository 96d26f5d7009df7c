//! In-memory fakes for the sensor and store seams.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::time::Instant;

use crate::db::{NewReading, ReadingStore, SensorReading, WindowTable};
use crate::error::{PipelineError, PipelineResult};
use crate::sensing::{Orientation, Sensor};

pub struct FakeSensor {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub orientation: Orientation,
    pub failing: AtomicBool,
    /// Completed orientation reads.
    pub reads: AtomicUsize,
    /// Samples begun, counted at the temperature read.
    pub started: AtomicUsize,
    /// Blocks every temperature read for this long.
    pub delay_ms: AtomicU64,
}

impl FakeSensor {
    pub fn new() -> Self {
        Self {
            temperature: 22.0,
            humidity: 48.0,
            pressure: 1011.0,
            orientation: Orientation {
                pitch: 4.0,
                roll: 5.0,
                yaw: 6.0,
            },
            failing: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("i2c bus read failed");
        }
        Ok(())
    }
}

impl Sensor for FakeSensor {
    fn read_temperature(&self) -> Result<f64> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.check()?;
        Ok(self.temperature)
    }

    fn read_humidity(&self) -> Result<f64> {
        self.check()?;
        Ok(self.humidity)
    }

    fn read_pressure(&self) -> Result<f64> {
        self.check()?;
        Ok(self.pressure)
    }

    fn read_orientation(&self) -> Result<Orientation> {
        self.check()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.orientation)
    }
}

/// Append-only store kept in a `Vec`. Timestamps advance one second per row.
///
/// With an append delay the row is committed first and the call returns
/// after the delay, like a store that is slow to acknowledge.
pub struct MemoryStore {
    rows: Mutex<Vec<SensorReading>>,
    committed_at: Mutex<Vec<Instant>>,
    pub append_delay_ms: AtomicU64,
    pub schema_created: AtomicBool,
    pub unavailable: AtomicBool,
    pub ensure_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            committed_at: Mutex::new(Vec::new()),
            append_delay_ms: AtomicU64::new(0),
            schema_created: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            ensure_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_schema() -> Self {
        let store = Self::new();
        store.schema_created.store(false, Ordering::SeqCst);
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_append_delay(&self, delay: Duration) {
        self.append_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// When each row was committed, in commit order.
    pub fn committed_at(&self) -> Vec<Instant> {
        self.committed_at
            .lock()
            .map(|times| times.clone())
            .unwrap_or_default()
    }

    pub fn rows(&self) -> Vec<SensorReading> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    fn gate(&self) -> PipelineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::StoreUnavailable(anyhow!("connection refused")));
        }
        if !self.schema_created.load(Ordering::SeqCst) {
            return Err(PipelineError::SchemaMissing);
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn ensure_schema(&self) -> PipelineResult<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::StoreUnavailable(anyhow!("connection refused")));
        }
        self.schema_created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn append(&self, reading: &NewReading) -> PipelineResult<SensorReading> {
        self.gate()?;
        let row = {
            let mut rows = self
                .rows
                .lock()
                .map_err(|_| PipelineError::CommitFailed(anyhow!("store lock poisoned")))?;
            let id = rows.len() as i64 + 1;
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let row = SensorReading {
                id,
                timestamp: reading
                    .timestamp
                    .unwrap_or(base + ChronoDuration::seconds(id)),
                temperature: Some(reading.temperature),
                humidity: Some(reading.humidity),
                pressure: Some(reading.pressure),
                pitch: Some(reading.pitch),
                roll: Some(reading.roll),
                yaw: Some(reading.yaw),
            };
            rows.push(row.clone());
            if let Ok(mut times) = self.committed_at.lock() {
                times.push(Instant::now());
            }
            row
        };

        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(row)
    }

    async fn latest(&self, n: usize) -> PipelineResult<WindowTable> {
        self.gate()?;
        let rows = self
            .rows
            .lock()
            .map_err(|_| PipelineError::StoreUnavailable(anyhow!("store lock poisoned")))?;
        let mut newest_first: Vec<SensorReading> = rows.clone();
        newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        newest_first.truncate(n);
        Ok(WindowTable::from_rows(newest_first))
    }
}
