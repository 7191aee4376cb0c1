//! Adapter Query Identifiers
//!
//! A [`QueryId`] is the opaque token the adapter is asked about. Most are
//! service/PID pairs; a few adapter-local values (firmware version, supply
//! voltage) are AT commands answered by the adapter itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::mode;

/// Standard PIDs used by the default parameter catalog
pub mod pid {
    /// Calculated engine load (mode 01)
    pub const ENGINE_LOAD: u8 = 0x04;
    /// Engine coolant temperature (mode 01)
    pub const COOLANT_TEMP: u8 = 0x05;
    /// Engine RPM (mode 01)
    pub const RPM: u8 = 0x0C;
    /// Vehicle speed (mode 01)
    pub const SPEED: u8 = 0x0D;
    /// Timing advance (mode 01)
    pub const TIMING_ADVANCE: u8 = 0x0E;
    /// Intake air temperature (mode 01)
    pub const INTAKE_TEMP: u8 = 0x0F;
    /// Mass air flow rate (mode 01)
    pub const MAF: u8 = 0x10;
    /// Throttle position (mode 01)
    pub const THROTTLE_POS: u8 = 0x11;
    /// Oxygen sensor voltage bank 1, sensor 1 (mode 01)
    pub const O2_B1S1: u8 = 0x14;
    /// Distance traveled with MIL on (mode 01)
    pub const DISTANCE_W_MIL: u8 = 0x21;
    /// Fuel tank level input (mode 01)
    pub const FUEL_LEVEL: u8 = 0x2F;
    /// Fuel type (mode 01)
    pub const FUEL_TYPE: u8 = 0x51;
    /// Vehicle identification number (mode 09)
    pub const VIN: u8 = 0x02;
}

/// Identifier for a single adapter query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QueryId {
    /// Service (mode) and PID pair, e.g. `010C`
    Pid { mode: u8, pid: u8 },
    /// Adapter-local AT command, e.g. `ATRV`
    At(String),
}

impl QueryId {
    /// Mode 01 (current data) query
    pub const fn current(pid: u8) -> Self {
        QueryId::Pid {
            mode: mode::CURRENT_DATA,
            pid,
        }
    }

    /// Mode 09 (vehicle information) query
    pub const fn vehicle_info(pid: u8) -> Self {
        QueryId::Pid {
            mode: mode::VEHICLE_INFO,
            pid,
        }
    }

    /// Adapter-local AT command
    pub fn at(command: &str) -> Self {
        QueryId::At(command.to_ascii_uppercase())
    }

    /// Whether the adapter answers this without asking the vehicle
    pub fn is_adapter_local(&self) -> bool {
        matches!(self, QueryId::At(_))
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryId::Pid { mode, pid } => write!(f, "{:02X}{:02X}", mode, pid),
            QueryId::At(command) => f.write_str(command),
        }
    }
}

/// Error parsing a query identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid query identifier {0:?}: expected 4 hex digits (e.g. 010C) or an AT command (e.g. ATRV)")]
pub struct ParseQueryIdError(pub String);

impl FromStr for QueryId {
    type Err = ParseQueryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.starts_with("AT") && upper.len() > 2 {
            if upper[2..].chars().all(|c| c.is_ascii_alphanumeric()) {
                return Ok(QueryId::At(upper));
            }
            return Err(ParseQueryIdError(s.to_string()));
        }

        if upper.len() != 4 || !upper.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseQueryIdError(s.to_string()));
        }

        let mode = u8::from_str_radix(&upper[0..2], 16).map_err(|_| ParseQueryIdError(s.to_string()))?;
        let pid = u8::from_str_radix(&upper[2..4], 16).map_err(|_| ParseQueryIdError(s.to_string()))?;
        Ok(QueryId::Pid { mode, pid })
    }
}

impl TryFrom<String> for QueryId {
    type Error = ParseQueryIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QueryId> for String {
    fn from(id: QueryId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_display() {
        assert_eq!(QueryId::current(pid::RPM).to_string(), "010C");
        assert_eq!(QueryId::vehicle_info(pid::VIN).to_string(), "0902");
    }

    #[test]
    fn test_parse_pid_and_at() {
        assert_eq!("010c".parse::<QueryId>().unwrap(), QueryId::current(0x0C));
        assert_eq!("atrv".parse::<QueryId>().unwrap(), QueryId::at("ATRV"));
        assert!(QueryId::at("ATI").is_adapter_local());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<QueryId>().is_err());
        assert!("01".parse::<QueryId>().is_err());
        assert!("01ZZ".parse::<QueryId>().is_err());
        assert!("AT".parse::<QueryId>().is_err());
        assert!("AT R V".parse::<QueryId>().is_err());
    }
}
