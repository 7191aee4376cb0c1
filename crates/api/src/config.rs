//! Pipeline configuration
//!
//! Loaded from an optional TOML file, then overridden by `OBD_LOGGER__*`
//! environment variables (`OBD_LOGGER__SERVER__BIND=0.0.0.0:9000`). Every
//! field has a default, so an empty configuration is valid.

use obd_protocol::{QueryId, SimulatorConfig};
use obd_session::{Parameter, ParameterCatalog, LIVE_SENSORS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::{Durability, LogFormat};

use crate::error::SettingsError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "OBD_LOGGER";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub adapter: AdapterConfig,
    /// Custom parameter catalog; empty means the standard catalog
    pub catalog: Vec<Parameter>,
    pub monitor: MonitorDefaults,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// Simulated adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub seed: u64,
    /// Query identifiers the simulated vehicle does not answer, e.g. `"015E"`
    pub unsupported: Vec<String>,
    pub fault_codes: Vec<String>,
    pub vin: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let simulator = SimulatorConfig::default();
        Self {
            seed: simulator.seed,
            unsupported: Vec::new(),
            fault_codes: simulator.fault_codes,
            vin: simulator.vin,
        }
    }
}

impl AdapterConfig {
    /// Simulator configuration, validating query identifiers
    pub fn simulator(&self) -> Result<SimulatorConfig, SettingsError> {
        let unsupported = self
            .unsupported
            .iter()
            .map(|s| s.parse::<QueryId>())
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(SimulatorConfig {
            seed: self.seed,
            unsupported,
            fault_codes: self.fault_codes.clone(),
            vin: self.vin.clone(),
        })
    }
}

/// Defaults applied to monitoring requests that leave a field out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorDefaults {
    pub interval_ms: u64,
    /// `None` runs until stopped
    pub duration_ms: Option<u64>,
    /// `None` uses the interval
    pub query_timeout_ms: Option<u64>,
    pub parameters: Vec<String>,
}

impl Default for MonitorDefaults {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            duration_ms: None,
            query_timeout_ms: None,
            parameters: LIVE_SENSORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MonitorDefaults {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `obd_sampler=debug,info`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Log store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub directory: PathBuf,
    pub format: LogFormat,
    pub durability: Durability,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            format: LogFormat::default(),
            durability: Durability::default(),
        }
    }
}

/// HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Prometheus exporter address; disabled when unset
    pub metrics_bind: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            metrics_bind: None,
        }
    }
}

impl PipelineConfig {
    /// Load from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Parameter catalog: the configured one, or the standard catalog
    pub fn catalog(&self) -> Result<ParameterCatalog, SettingsError> {
        if self.catalog.is_empty() {
            return Ok(ParameterCatalog::standard());
        }
        Ok(ParameterCatalog::new(self.catalog.clone())?)
    }

    /// Check everything that can be checked before serving
    pub fn validate(&self) -> Result<(), SettingsError> {
        let catalog = self.catalog()?;
        catalog.select(&self.monitor.parameters)?;
        self.adapter.simulator()?;
        if self.monitor.interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "monitor.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_session::ParameterKind;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.monitor.parameters.len(), 4);
        assert_eq!(config.storage.directory, PathBuf::from("logs"));
        assert_eq!(config.catalog().unwrap().len(), 15);
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[monitor]
interval_ms = 250
parameters = ["RPM", "Boost"]

[storage]
format = "jsonl"
durability = "flush"

[[catalog]]
name = "RPM"
query_id = "010C"
kind = "numeric"

[[catalog]]
name = "Boost"
query_id = "010B"
kind = "numeric"
"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.monitor.interval_ms, 250);
        assert_eq!(config.storage.format, LogFormat::Jsonl);
        assert_eq!(config.storage.durability, Durability::Flush);
        assert_eq!(config.server.bind, "0.0.0.0:8080");

        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("Boost").unwrap().kind, ParameterKind::Numeric);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(PipelineConfig::load(Some(Path::new("/nonexistent/obd.toml"))).is_err());
    }

    #[test]
    fn test_unknown_default_parameter_rejected() {
        let mut config = PipelineConfig::default();
        config.monitor.parameters.push("Warp Factor".to_string());
        assert!(matches!(config.validate(), Err(SettingsError::Catalog(_))));
    }

    #[test]
    fn test_bad_unsupported_query_rejected() {
        let mut config = PipelineConfig::default();
        config.adapter.unsupported = vec!["zz".to_string()];
        assert!(matches!(config.validate(), Err(SettingsError::QueryId(_))));
    }
}
