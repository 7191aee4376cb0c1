//! Diagnostic Report Assembly
//!
//! Combines a vehicle-info snapshot, stored trouble codes, a final sensor
//! snapshot, and aggregation results into one [`DiagnosticReport`]. Assembly
//! is a pure function; collecting the inputs is the caller's job.

mod dtc;

pub use dtc::{DtcDescriber, SystemPrefixDescriber};

use aggregator::Snapshot;
use chrono::{DateTime, Utc};
use obd_session::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Report errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A stored trouble code with its description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultCode {
    pub code: String,
    pub description: String,
}

/// Everything a report is built from
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub generated_at: DateTime<Utc>,
    pub vehicle_info: BTreeMap<String, String>,
    /// Codes in the order the adapter reported them
    pub fault_codes: Vec<String>,
    pub final_readings: BTreeMap<String, Value>,
    pub aggregates: Snapshot,
}

/// Structured diagnostic report for external renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Utc>,
    pub vehicle_info: BTreeMap<String, String>,
    pub fault_codes: Vec<FaultCode>,
    pub final_readings: BTreeMap<String, Value>,
    pub aggregates: Snapshot,
}

impl DiagnosticReport {
    /// Whether any trouble code is stored
    pub fn has_faults(&self) -> bool {
        !self.fault_codes.is_empty()
    }

    /// Final readings that returned a value
    pub fn available_readings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.final_readings
            .iter()
            .filter(|(_, v)| !v.is_absent())
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Assemble a report
///
/// Codes are trimmed and upper-cased, blank codes are dropped, and order is
/// preserved.
pub fn assemble(inputs: ReportInputs, describer: &dyn DtcDescriber) -> DiagnosticReport {
    let fault_codes = inputs
        .fault_codes
        .iter()
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .map(|code| FaultCode {
            description: describer.describe(&code),
            code,
        })
        .collect();

    DiagnosticReport {
        generated_at: inputs.generated_at,
        vehicle_info: inputs.vehicle_info,
        fault_codes,
        final_readings: inputs.final_readings,
        aggregates: inputs.aggregates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggregator::Aggregator;
    use chrono::TimeZone;
    use obd_protocol::{pid, QueryId};
    use obd_session::{Parameter, Record, Sample};

    fn inputs() -> ReportInputs {
        let rpm = Parameter::numeric("RPM", QueryId::current(pid::RPM));
        let mut aggregator = Aggregator::new();
        for (tick, v) in [800.0, 820.0].into_iter().enumerate() {
            aggregator.observe(&Record::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, tick as u32).unwrap(),
                tick as u64,
                vec![Sample::new(&rpm, Value::Numeric(v))],
            ));
        }

        ReportInputs {
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 31, 0).unwrap(),
            vehicle_info: BTreeMap::from([("VIN".to_string(), "1HGCM82633A004352".to_string())]),
            fault_codes: vec!["P0301".into(), " u0100 ".into(), "".into()],
            final_readings: BTreeMap::from([
                ("RPM".to_string(), Value::Numeric(815.0)),
                ("Speed".to_string(), Value::Absent),
            ]),
            aggregates: aggregator.snapshot(),
        }
    }

    /// Describer with a fixed dictionary
    struct Dictionary;

    impl DtcDescriber for Dictionary {
        fn describe(&self, code: &str) -> String {
            match code {
                "P0301" => "Cylinder 1 misfire detected".to_string(),
                _ => "Not in dictionary".to_string(),
            }
        }
    }

    #[test]
    fn test_assemble_keeps_code_order() {
        let report = assemble(inputs(), &SystemPrefixDescriber);
        let codes: Vec<&str> = report.fault_codes.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(codes, ["P0301", "U0100"]);
        assert_eq!(report.fault_codes[1].description, "Network related issue (Code: U0100)");
        assert!(report.has_faults());
        assert_eq!(report.aggregates["RPM"].average, Some(810.0));
    }

    #[test]
    fn test_describer_is_injectable() {
        let report = assemble(inputs(), &Dictionary);
        assert_eq!(report.fault_codes[0].description, "Cylinder 1 misfire detected");
    }

    #[test]
    fn test_assembly_is_deterministic() {
        assert_eq!(
            assemble(inputs(), &SystemPrefixDescriber),
            assemble(inputs(), &SystemPrefixDescriber)
        );
    }

    #[test]
    fn test_available_readings_skip_absent() {
        let report = assemble(inputs(), &SystemPrefixDescriber);
        let names: Vec<&str> = report.available_readings().map(|(k, _)| k).collect();
        assert_eq!(names, ["RPM"]);
    }

    #[test]
    fn test_json_shape() {
        let report = assemble(inputs(), &SystemPrefixDescriber);
        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["vehicle_info"]["VIN"], "1HGCM82633A004352");
        assert_eq!(json["final_readings"]["Speed"], serde_json::Value::Null);
        assert_eq!(json["aggregates"]["RPM"]["count"], 2);
        assert_eq!(json["fault_codes"][0]["code"], "P0301");
    }

    #[test]
    fn test_empty_inputs() {
        let report = assemble(ReportInputs::default(), &SystemPrefixDescriber);
        assert!(!report.has_faults());
        assert!(report.aggregates.is_empty());
    }
}
