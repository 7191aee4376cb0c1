//! OBD-II Adapter Capability
//!
//! This crate describes what the rest of the pipeline needs from a diagnostic
//! adapter: open a link, answer queries, read and clear trouble codes. The
//! adapter itself is a black box behind the [`Adapter`] trait; a deterministic
//! [`SimulatedAdapter`] and a [`testing::ScriptedAdapter`] are provided.

mod adapter;
mod error;
mod query;
mod simulator;
pub mod testing;

pub use adapter::{Adapter, Reading};
pub use error::ObdError;
pub use query::{pid, ParseQueryIdError, QueryId};
pub use simulator::{SimulatedAdapter, SimulatorConfig};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Freeze frame data
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
}
