//! Sampler Error Types

use obd_session::{SessionError, SinkError};
use thiserror::Error;

/// Errors that end a sampling run
#[derive(Debug, Clone, Error)]
pub enum SamplerError {
    /// The adapter link was lost
    #[error("Connection lost: {0}")]
    Connection(#[source] SessionError),

    /// A sink could not accept or flush a record
    #[error("Persistence failed: {0}")]
    Persistence(#[source] SinkError),

    /// The polling interval was zero
    #[error("Sampling interval must be greater than zero")]
    InvalidInterval,
}

/// Errors from the monitor control surface
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("A monitoring run is already active")]
    AlreadyRunning,

    #[error(transparent)]
    Sampler(#[from] SamplerError),

    #[error("Sampling task failed: {0}")]
    TaskFailed(String),
}
