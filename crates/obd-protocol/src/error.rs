//! OBD-II Adapter Error Types

use thiserror::Error;

/// Errors that can occur while talking to an OBD-II adapter
#[derive(Debug, Clone, Error)]
pub enum ObdError {
    /// Transport (serial, Bluetooth, TCP) could not be opened or broke
    #[error("Transport error: {0}")]
    Transport(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Query not supported by vehicle
    #[error("Query {0} not supported by vehicle")]
    NotSupported(String),

    /// Adapter not responding
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// Vehicle not connected
    #[error("Vehicle ignition is off or not connected")]
    VehicleNotConnected,

    /// Operation attempted on a closed link
    #[error("Adapter link is closed")]
    Closed,
}

impl ObdError {
    /// Whether the error means the link itself is gone.
    ///
    /// Link failures end a session. Everything else is scoped to the single
    /// request that produced it.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ObdError::Transport(_)
                | ObdError::AdapterNotResponding
                | ObdError::VehicleNotConnected
                | ObdError::Closed
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}
