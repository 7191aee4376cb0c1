//! Simulated OBD-II Adapter
//!
//! Produces plausible, deterministic readings without hardware. Used by the
//! binary's `simulated` adapter kind and by demos.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use tracing::{debug, info};

use crate::adapter::{Adapter, Reading};
use crate::error::ObdError;
use crate::query::{pid, QueryId};
use crate::mode;

/// Configuration for the simulated adapter
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Seed mixed into every generated value
    pub seed: u64,
    /// Queries the simulated vehicle does not support
    pub unsupported: HashSet<QueryId>,
    /// Trouble codes stored in the simulated ECU
    pub fault_codes: Vec<String>,
    /// Vehicle identification number
    pub vin: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            unsupported: HashSet::new(),
            fault_codes: vec!["P0301".to_string(), "U0100".to_string()],
            vin: "1HGCM82633A004352".to_string(),
        }
    }
}

/// Adapter that synthesizes readings for the standard PIDs
pub struct SimulatedAdapter {
    config: SimulatorConfig,
    connected: bool,
    /// Number of queries answered, drives value variation
    counter: u64,
}

impl SimulatedAdapter {
    /// Create a simulator with the given configuration
    pub fn new(config: SimulatorConfig) -> Self {
        info!("Creating simulated OBD adapter (seed {:#x})", config.seed);
        Self {
            config,
            connected: false,
            counter: 0,
        }
    }

    fn all_queries() -> Vec<QueryId> {
        let mut queries: Vec<QueryId> = [
            pid::ENGINE_LOAD,
            pid::COOLANT_TEMP,
            pid::RPM,
            pid::SPEED,
            pid::TIMING_ADVANCE,
            pid::INTAKE_TEMP,
            pid::MAF,
            pid::THROTTLE_POS,
            pid::O2_B1S1,
            pid::DISTANCE_W_MIL,
            pid::FUEL_LEVEL,
            pid::FUEL_TYPE,
        ]
        .into_iter()
        .map(QueryId::current)
        .collect();
        queries.push(QueryId::vehicle_info(pid::VIN));
        queries.push(QueryId::at("ATI"));
        queries.push(QueryId::at("ATRV"));
        queries
    }

    /// Generate a reading for a query
    fn generate(&self, id: &QueryId) -> Option<Reading> {
        // Pseudo-random but deterministic for a given seed and call count
        let mut hasher = DefaultHasher::new();
        self.config.seed.hash(&mut hasher);
        self.counter.hash(&mut hasher);
        id.hash(&mut hasher);
        let hash = hasher.finish();

        let reading = match id {
            QueryId::Pid {
                mode: mode::CURRENT_DATA,
                pid: code,
            } => match *code {
                // RPM: 800-3500 RPM range, quarter-rpm resolution
                pid::RPM => Reading::Number(800.0 + (hash % 10_800) as f64 / 4.0),
                // Speed: 0-120 km/h
                pid::SPEED => Reading::Number((hash % 121) as f64),
                // Coolant temp: 70-105°C
                pid::COOLANT_TEMP => Reading::Number(70.0 + (hash % 36) as f64),
                // Engine load / throttle: 20-80%
                pid::ENGINE_LOAD | pid::THROTTLE_POS => {
                    Reading::Number((51 + (hash % 153)) as f64 * 100.0 / 255.0)
                }
                // MAF: 5-50 g/s
                pid::MAF => Reading::Number((500 + (hash % 4500)) as f64 / 100.0),
                // Intake temp: 15-45°C
                pid::INTAKE_TEMP => Reading::Number(15.0 + (hash % 31) as f64),
                // O2 voltage: 0.1-0.9V
                pid::O2_B1S1 => Reading::Number((20 + (hash % 160)) as f64 / 200.0),
                // Timing advance: -5 to 35 degrees, half-degree resolution
                pid::TIMING_ADVANCE => Reading::Number((hash % 81) as f64 / 2.0 - 5.0),
                pid::FUEL_LEVEL => Reading::Number(((hash % 256) as f64) * 100.0 / 255.0),
                pid::DISTANCE_W_MIL => Reading::Number(0.0),
                pid::FUEL_TYPE => Reading::Text("Gasoline".to_string()),
                _ => return None,
            },
            QueryId::Pid {
                mode: mode::VEHICLE_INFO,
                pid: pid::VIN,
            } => Reading::Text(self.config.vin.clone()),
            QueryId::At(command) if command == "ATI" => Reading::Text("ELM327 v1.5".to_string()),
            // Supply voltage: 12.0-14.4V
            QueryId::At(command) if command == "ATRV" => {
                Reading::Number(12.0 + (hash % 25) as f64 / 10.0)
            }
            _ => return None,
        };

        Some(reading)
    }
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

#[async_trait]
impl Adapter for SimulatedAdapter {
    fn describe(&self) -> String {
        "simulated".to_string()
    }

    async fn connect(&mut self) -> Result<(), ObdError> {
        debug!("Simulated adapter: skipping initialization");
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn supported_queries(&mut self) -> Result<HashSet<QueryId>, ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }
        Ok(Self::all_queries()
            .into_iter()
            .filter(|q| !self.config.unsupported.contains(q))
            .collect())
    }

    async fn query(&mut self, id: &QueryId) -> Result<Option<Reading>, ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }
        if self.config.unsupported.contains(id) {
            return Ok(None);
        }
        self.counter = self.counter.wrapping_add(1);
        Ok(self.generate(id))
    }

    async fn read_fault_codes(&mut self) -> Result<Option<Vec<String>>, ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }
        if self.config.fault_codes.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.config.fault_codes.clone()))
    }

    async fn clear_fault_codes(&mut self) -> Result<(), ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }
        info!("Simulated adapter: clearing {} trouble codes", self.config.fault_codes.len());
        self.config.fault_codes.clear();
        Ok(())
    }

    async fn close(&mut self) {
        if self.connected {
            info!("Disconnecting simulated adapter");
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_rpm_in_range() {
        let mut adapter = SimulatedAdapter::default();
        adapter.connect().await.unwrap();
        for _ in 0..50 {
            match adapter.query(&QueryId::current(pid::RPM)).await.unwrap() {
                Some(Reading::Number(rpm)) => assert!((800.0..=3500.0).contains(&rpm)),
                other => panic!("unexpected reading {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_unsupported_query_is_null() {
        let config = SimulatorConfig {
            unsupported: [QueryId::current(pid::MAF)].into_iter().collect(),
            ..Default::default()
        };
        let mut adapter = SimulatedAdapter::new(config);
        adapter.connect().await.unwrap();

        assert!(adapter.query(&QueryId::current(pid::MAF)).await.unwrap().is_none());
        let supported = adapter.supported_queries().await.unwrap();
        assert!(!supported.contains(&QueryId::current(pid::MAF)));
        assert!(supported.contains(&QueryId::current(pid::RPM)));
    }

    #[tokio::test]
    async fn test_query_before_connect_fails() {
        let mut adapter = SimulatedAdapter::default();
        let err = adapter.query(&QueryId::current(pid::RPM)).await.unwrap_err();
        assert!(err.is_link_failure());
    }

    #[tokio::test]
    async fn test_clear_fault_codes() {
        let mut adapter = SimulatedAdapter::default();
        adapter.connect().await.unwrap();
        assert!(adapter.read_fault_codes().await.unwrap().is_some());
        adapter.clear_fault_codes().await.unwrap();
        assert!(adapter.read_fault_codes().await.unwrap().is_none());
    }
}
