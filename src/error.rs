//! Error taxonomy shared by the sampler, the store and the window reader.
//!
//! Every variant is scoped to a single sampling cycle or refresh tick; the
//! loops log it and carry on.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sensor unavailable: {0:#}")]
    SensorUnavailable(anyhow::Error),

    #[error("store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    #[error("commit failed: {0:#}")]
    CommitFailed(anyhow::Error),

    /// The append was abandoned after `timeout`; the store may still have
    /// committed it.
    #[error("store append timed out after {}ms; commit outcome unknown", .timeout.as_millis())]
    CommitUnknown { timeout: Duration },

    #[error("sensor_data table is missing")]
    SchemaMissing,

    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl PipelineError {
    /// Short machine-friendly label, used in logs and the dashboard snapshot.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SensorUnavailable(_) => "sensor_unavailable",
            PipelineError::StoreUnavailable(_) => "store_unavailable",
            PipelineError::CommitFailed(_) => "commit_failed",
            PipelineError::CommitUnknown { .. } => "commit_unknown",
            PipelineError::SchemaMissing => "schema_missing",
            PipelineError::Timeout { .. } => "timeout",
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
