//! The store contract shared by the sampler and the window reader.

use async_trait::async_trait;

use crate::db::{
    is_connection_fault, is_missing_table, Database, NewReading, SensorReading, WindowTable,
};
use crate::error::{PipelineError, PipelineResult};

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Idempotent create-if-absent of the readings table.
    async fn ensure_schema(&self) -> PipelineResult<()>;

    /// Appends one reading, committed before returning.
    async fn append(&self, reading: &NewReading) -> PipelineResult<SensorReading>;

    /// Up to `n` most recent readings, newest first. Empty when the table is.
    async fn latest(&self, n: usize) -> PipelineResult<WindowTable>;
}

fn classify_read(err: anyhow::Error) -> PipelineError {
    if is_missing_table(&err) {
        PipelineError::SchemaMissing
    } else {
        PipelineError::StoreUnavailable(err)
    }
}

fn classify_write(err: anyhow::Error) -> PipelineError {
    if is_missing_table(&err) {
        PipelineError::SchemaMissing
    } else if is_connection_fault(&err) {
        PipelineError::StoreUnavailable(err)
    } else {
        PipelineError::CommitFailed(err)
    }
}

#[async_trait]
impl ReadingStore for Database {
    async fn ensure_schema(&self) -> PipelineResult<()> {
        Database::ensure_schema(self)
            .await
            .map_err(PipelineError::StoreUnavailable)
    }

    async fn append(&self, reading: &NewReading) -> PipelineResult<SensorReading> {
        self.insert_reading(reading).await.map_err(classify_write)
    }

    async fn latest(&self, n: usize) -> PipelineResult<WindowTable> {
        if n == 0 {
            return Ok(WindowTable::default());
        }
        self.latest_readings(n)
            .await
            .map(WindowTable::from_rows)
            .map_err(classify_read)
    }
}
