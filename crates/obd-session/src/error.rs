//! Session and Catalog Error Types

use obd_protocol::ObdError;
use thiserror::Error;

/// Errors raised while building or using the parameter catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Two parameters share a name
    #[error("Duplicate parameter name: {0}")]
    DuplicateName(String),

    /// A parameter has an empty name
    #[error("Parameter names must not be empty")]
    EmptyName,

    /// A requested name is not in the catalog
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// No parameters were requested
    #[error("At least one parameter must be requested")]
    EmptySelection,
}

/// Errors raised by a live session
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Adapter unreachable or link lost; fatal to the session
    #[error("Connection error: {0}")]
    Connection(#[source] ObdError),

    /// A single request failed; the session is still usable
    #[error("Query for {parameter} failed: {source}")]
    Query {
        parameter: String,
        #[source]
        source: ObdError,
    },
}

impl SessionError {
    /// Whether the session can no longer be used
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Connection(_))
    }
}
