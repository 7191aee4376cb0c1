//! Adapter Capability
//!
//! The diagnostic adapter is consumed as a black box. Anything that can open a
//! link, answer queries, and read/clear trouble codes can back a session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ObdError;
use crate::query::QueryId;

/// A decoded adapter response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    /// Numeric quantity in the parameter's engineering unit
    Number(f64),
    /// Textual value (VIN, fuel type, firmware string)
    Text(String),
}

/// Capability exposed by an OBD-II adapter
///
/// `Ok(None)` from [`Adapter::query`] and [`Adapter::read_fault_codes`] is the
/// adapter's "null" answer (NO DATA, unsupported). It is a normal outcome.
#[async_trait]
pub trait Adapter: Send {
    /// Human readable description of the adapter (device path, simulator name)
    fn describe(&self) -> String;

    /// Open the transport and initialize the adapter
    async fn connect(&mut self) -> Result<(), ObdError>;

    /// Whether the link to the vehicle is up
    fn is_connected(&self) -> bool;

    /// Queries the vehicle reports as supported
    async fn supported_queries(&mut self) -> Result<HashSet<QueryId>, ObdError>;

    /// Send one request
    async fn query(&mut self, id: &QueryId) -> Result<Option<Reading>, ObdError>;

    /// Read stored diagnostic trouble codes
    async fn read_fault_codes(&mut self) -> Result<Option<Vec<String>>, ObdError>;

    /// Clear stored diagnostic trouble codes
    async fn clear_fault_codes(&mut self) -> Result<(), ObdError>;

    /// Release the transport
    async fn close(&mut self);
}
