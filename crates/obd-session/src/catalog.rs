//! Parameter Catalog
//!
//! Maps logical parameter names to adapter query identifiers. The catalog is
//! validated once at startup; unknown names are rejected when a monitoring
//! request is built, never in the middle of a run.

use obd_protocol::{pid, QueryId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::CatalogError;

/// Whether a parameter can be aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// Numeric reading, aggregated into min/max/average
    Numeric,
    /// Informational text, last value kept only
    Text,
}

impl ParameterKind {
    /// Lowercase name used in log headers
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::Numeric => "numeric",
            ParameterKind::Text => "text",
        }
    }

    /// Parse a log header kind
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "numeric" => Some(ParameterKind::Numeric),
            "text" => Some(ParameterKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, queryable vehicle metric
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique display name
    pub name: String,
    /// Adapter query identifier
    pub query_id: QueryId,
    /// Aggregation kind
    pub kind: ParameterKind,
}

impl Parameter {
    /// Create a numeric parameter
    pub fn numeric(name: &str, query_id: QueryId) -> Self {
        Self {
            name: name.to_string(),
            query_id,
            kind: ParameterKind::Numeric,
        }
    }

    /// Create a text parameter
    pub fn text(name: &str, query_id: QueryId) -> Self {
        Self {
            name: name.to_string(),
            query_id,
            kind: ParameterKind::Text,
        }
    }
}

/// Live sensors polled by default
pub const LIVE_SENSORS: [&str; 4] = ["RPM", "Speed", "Throttle Position", "Engine Load"];

/// Parameters read once for the vehicle information block of a report
pub const VEHICLE_INFO: [&str; 5] = [
    "VIN",
    "ELM Version",
    "Battery Voltage",
    "Fuel Type",
    "Distance with MIL",
];

/// Sensors read once for the final readings block of a report
pub const REPORT_SENSORS: [&str; 10] = [
    "RPM",
    "Speed",
    "Throttle Position",
    "Engine Load",
    "Coolant Temp",
    "Intake Temp",
    "MAF",
    "O2 Voltage",
    "Fuel Level",
    "Timing Advance",
];

/// Ordered, validated set of parameters
#[derive(Debug, Clone)]
pub struct ParameterCatalog {
    parameters: Vec<Parameter>,
    index: HashMap<String, usize>,
}

impl ParameterCatalog {
    /// Build a catalog, rejecting duplicate or empty names
    pub fn new(parameters: Vec<Parameter>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(parameters.len());
        for (position, parameter) in parameters.iter().enumerate() {
            if parameter.name.trim().is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if index.insert(parameter.name.clone(), position).is_some() {
                return Err(CatalogError::DuplicateName(parameter.name.clone()));
            }
        }
        Ok(Self { parameters, index })
    }

    /// The standard catalog of mode 01 sensors and vehicle information
    pub fn standard() -> Self {
        let parameters = vec![
            Parameter::numeric("RPM", QueryId::current(pid::RPM)),
            Parameter::numeric("Speed", QueryId::current(pid::SPEED)),
            Parameter::numeric("Throttle Position", QueryId::current(pid::THROTTLE_POS)),
            Parameter::numeric("Engine Load", QueryId::current(pid::ENGINE_LOAD)),
            Parameter::numeric("Coolant Temp", QueryId::current(pid::COOLANT_TEMP)),
            Parameter::numeric("Intake Temp", QueryId::current(pid::INTAKE_TEMP)),
            Parameter::numeric("MAF", QueryId::current(pid::MAF)),
            Parameter::numeric("O2 Voltage", QueryId::current(pid::O2_B1S1)),
            Parameter::numeric("Fuel Level", QueryId::current(pid::FUEL_LEVEL)),
            Parameter::numeric("Timing Advance", QueryId::current(pid::TIMING_ADVANCE)),
            Parameter::text("VIN", QueryId::vehicle_info(pid::VIN)),
            Parameter::text("ELM Version", QueryId::at("ATI")),
            Parameter::numeric("Battery Voltage", QueryId::at("ATRV")),
            Parameter::text("Fuel Type", QueryId::current(pid::FUEL_TYPE)),
            Parameter::numeric("Distance with MIL", QueryId::current(pid::DISTANCE_W_MIL)),
        ];

        // Names above are unique by construction
        let index = parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        Self { parameters, index }
    }

    /// Look up a parameter by name
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.index.get(name).map(|&i| &self.parameters[i])
    }

    /// Resolve requested names into parameters in catalog order
    ///
    /// Duplicated names are collapsed. Any unknown name fails the whole
    /// selection.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Parameter>, CatalogError> {
        if names.is_empty() {
            return Err(CatalogError::EmptySelection);
        }

        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let position = self
                .index
                .get(name)
                .ok_or_else(|| CatalogError::UnknownParameter(name.to_string()))?;
            positions.push(*position);
        }
        positions.sort_unstable();
        positions.dedup();

        Ok(positions
            .into_iter()
            .map(|i| self.parameters[i].clone())
            .collect())
    }

    /// Resolve names, skipping those not in the catalog
    pub fn select_known<S: AsRef<str>>(&self, names: &[S]) -> Vec<Parameter> {
        let known: Vec<&str> = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| self.index.contains_key(*n))
            .collect();
        self.select(&known).unwrap_or_default()
    }

    /// All parameters in catalog order
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

impl Default for ParameterCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_has_default_groups() {
        let catalog = ParameterCatalog::standard();
        for name in LIVE_SENSORS.iter().chain(&VEHICLE_INFO).chain(&REPORT_SENSORS) {
            assert!(catalog.get(name).is_some(), "missing {}", name);
        }
        assert_eq!(catalog.get("VIN").unwrap().kind, ParameterKind::Text);
        assert_eq!(catalog.get("RPM").unwrap().kind, ParameterKind::Numeric);
    }

    #[test]
    fn test_select_uses_catalog_order_and_dedups() {
        let catalog = ParameterCatalog::standard();
        let selected = catalog.select(&["Speed", "RPM", "Speed"]).unwrap();
        let names: Vec<_> = selected.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["RPM", "Speed"]);
    }

    #[test]
    fn test_select_rejects_unknown_eagerly() {
        let catalog = ParameterCatalog::standard();
        assert_eq!(
            catalog.select(&["RPM", "Warp Drive"]),
            Err(CatalogError::UnknownParameter("Warp Drive".to_string()))
        );
        assert_eq!(
            catalog.select::<&str>(&[]),
            Err(CatalogError::EmptySelection)
        );
    }

    #[test]
    fn test_select_known_skips_unknown() {
        let catalog = ParameterCatalog::standard();
        let selected = catalog.select_known(&["Warp Drive", "MAF"]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "MAF");
        assert!(catalog.select_known(&["Warp Drive"]).is_empty());
    }

    #[test]
    fn test_custom_catalog_validation() {
        let duplicate = ParameterCatalog::new(vec![
            Parameter::numeric("RPM", QueryId::current(pid::RPM)),
            Parameter::numeric("RPM", QueryId::current(pid::SPEED)),
        ]);
        assert_eq!(
            duplicate.unwrap_err(),
            CatalogError::DuplicateName("RPM".to_string())
        );

        let empty = ParameterCatalog::new(vec![Parameter::numeric(" ", QueryId::current(pid::RPM))]);
        assert_eq!(empty.unwrap_err(), CatalogError::EmptyName);
    }

    #[test]
    fn test_parameter_deserializes_from_config_shape() {
        let json = r#"{"name":"Boost","query_id":"010B","kind":"numeric"}"#;
        let parameter: Parameter = serde_json::from_str(json).unwrap();
        assert_eq!(parameter.query_id, QueryId::current(0x0B));
        assert_eq!(parameter.kind, ParameterKind::Numeric);
    }
}
