//! Readings Data Model
//!
//! A [`Record`] is the ordered group of [`Sample`]s taken in one polling tick.
//! Records are immutable once built and are handed to consumers by reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{Parameter, ParameterKind};

/// A single reading outcome
///
/// `Absent` means the adapter had nothing to report. It is distinct from a
/// zero reading and from an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric reading
    Numeric(f64),
    /// Text reading
    Text(String),
    /// No value returned
    Absent,
}

impl Value {
    /// Numeric payload, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the adapter returned nothing
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Absent => f.write_str("--"),
        }
    }
}

/// One parameter's reading within a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Parameter name
    pub name: String,
    /// Parameter kind at the time of sampling
    pub kind: ParameterKind,
    /// Reading
    pub value: Value,
}

impl Sample {
    /// Create a sample for a catalog parameter
    pub fn new(parameter: &Parameter, value: Value) -> Self {
        Self {
            name: parameter.name.clone(),
            kind: parameter.kind,
            value,
        }
    }
}

/// Timestamped group of samples taken in the same tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Start of the tick
    pub timestamp: DateTime<Utc>,
    /// Tick number within the run, starting at 0
    pub tick: u64,
    /// Samples in catalog order
    pub samples: Vec<Sample>,
}

impl Record {
    /// Create a record
    pub fn new(timestamp: DateTime<Utc>, tick: u64, samples: Vec<Sample>) -> Self {
        Self {
            timestamp,
            tick,
            samples,
        }
    }

    /// Value recorded for a parameter
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.samples.iter().find(|s| s.name == name).map(|s| &s.value)
    }

    /// Number of absent samples
    pub fn absent_count(&self) -> usize {
        self.samples.iter().filter(|s| s.value.is_absent()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{pid, QueryId};

    #[test]
    fn test_absent_is_not_zero_or_empty() {
        assert_ne!(Value::Absent, Value::Numeric(0.0));
        assert_ne!(Value::Absent, Value::Text(String::new()));
        assert!(Value::Absent.as_f64().is_none());
    }

    #[test]
    fn test_value_json_shape() {
        assert_eq!(serde_json::to_string(&Value::Numeric(800.5)).unwrap(), "800.5");
        assert_eq!(serde_json::to_string(&Value::Text("abc".into())).unwrap(), "\"abc\"");
        assert_eq!(serde_json::to_string(&Value::Absent).unwrap(), "null");
        assert_eq!(serde_json::from_str::<Value>("null").unwrap(), Value::Absent);
        assert_eq!(serde_json::from_str::<Value>("\"\"").unwrap(), Value::Text(String::new()));
        assert_eq!(serde_json::from_str::<Value>("0").unwrap(), Value::Numeric(0.0));
    }

    #[test]
    fn test_record_lookup() {
        let rpm = Parameter::numeric("RPM", QueryId::current(pid::RPM));
        let speed = Parameter::numeric("Speed", QueryId::current(pid::SPEED));
        let record = Record::new(
            Utc::now(),
            0,
            vec![
                Sample::new(&rpm, Value::Numeric(800.0)),
                Sample::new(&speed, Value::Absent),
            ],
        );
        assert_eq!(record.get("RPM"), Some(&Value::Numeric(800.0)));
        assert_eq!(record.get("Speed"), Some(&Value::Absent));
        assert_eq!(record.get("MAF"), None);
        assert_eq!(record.absent_count(), 1);
    }
}
