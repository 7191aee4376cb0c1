//! JSON Lines log encoding
//!
//! ```text
//! {"schema":[{"name":"RPM","kind":"numeric"},{"name":"VIN","kind":"text"}]}
//! {"timestamp":"2024-03-01T12:30:05Z","data":{"RPM":800.0,"VIN":"WVWZZZ1JZXW000001"}}
//! {"timestamp":"2024-03-01T12:30:06Z","data":{"RPM":null,"VIN":null}}
//! ```
//!
//! Older `.json` logs are a single array of `{"timestamp", "data"}` objects
//! with every reading stringified. Those are read whole and treated as
//! all-numeric, like legacy CSV.

use obd_session::{ParameterKind, Record, Sample, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::{format_timestamp, parse_timestamp, Column};

#[derive(Serialize, Deserialize)]
struct Header {
    schema: Vec<Column>,
}

#[derive(Serialize)]
struct EntryOut<'a> {
    timestamp: String,
    data: BTreeMap<&'a str, &'a Value>,
}

#[derive(Deserialize)]
struct EntryIn {
    timestamp: String,
    data: HashMap<String, Value>,
}

pub(crate) fn encode_header(columns: &[Column]) -> Result<String, String> {
    let header = Header {
        schema: columns.to_vec(),
    };
    let mut line = serde_json::to_string(&header).map_err(|e| e.to_string())?;
    line.push('\n');
    Ok(line)
}

pub(crate) fn encode_entry(record: &Record) -> Result<String, String> {
    let entry = EntryOut {
        timestamp: format_timestamp(&record.timestamp),
        data: record
            .samples
            .iter()
            .map(|s| (s.name.as_str(), &s.value))
            .collect(),
    };
    let mut line = serde_json::to_string(&entry).map_err(|e| e.to_string())?;
    line.push('\n');
    Ok(line)
}

pub(crate) fn parse_header(line: &str) -> Result<Vec<Column>, String> {
    let header: Header =
        serde_json::from_str(line).map_err(|e| format!("invalid schema line: {}", e))?;
    Ok(header.schema)
}

pub(crate) fn decode_entry(line: &str, columns: &[Column], tick: u64) -> Result<Record, String> {
    let mut entry: EntryIn = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let timestamp = parse_timestamp(&entry.timestamp)?;

    let mut samples = Vec::with_capacity(columns.len());
    for column in columns {
        let value = entry
            .data
            .remove(&column.name)
            .ok_or_else(|| format!("{}: missing", column.name))?;
        match (column.kind, &value) {
            (ParameterKind::Numeric, Value::Text(_)) => {
                return Err(format!("{}: text in numeric column", column.name))
            }
            (ParameterKind::Text, Value::Numeric(_)) => {
                return Err(format!("{}: number in text column", column.name))
            }
            _ => {}
        }
        samples.push(Sample {
            name: column.name.clone(),
            kind: column.kind,
            value,
        });
    }

    Ok(Record::new(timestamp, tick, samples))
}

/// Columns of a legacy array log, in first-seen order
pub(crate) fn legacy_columns(entries: &[serde_json::Value]) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    for entry in entries {
        let Some(data) = entry.get("data").and_then(|d| d.as_object()) else {
            continue;
        };
        for name in data.keys() {
            if !columns.iter().any(|c| &c.name == name) {
                columns.push(Column {
                    name: name.clone(),
                    kind: ParameterKind::Numeric,
                });
            }
        }
    }
    columns
}

/// Decode one element of a legacy array log
///
/// Numbers and numeric strings are readings; `null`, missing keys, and
/// anything unparsable are absent.
pub(crate) fn decode_legacy_entry(
    entry: &serde_json::Value,
    columns: &[Column],
    tick: u64,
) -> Result<Record, String> {
    let timestamp = entry
        .get("timestamp")
        .and_then(|t| t.as_str())
        .ok_or("missing timestamp")?;
    let timestamp = parse_timestamp(timestamp)?;
    let data = entry
        .get("data")
        .and_then(|d| d.as_object())
        .ok_or("missing data")?;

    let samples = columns
        .iter()
        .map(|column| {
            let reading = match data.get(&column.name) {
                Some(serde_json::Value::Number(n)) => n.as_f64(),
                Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            Sample {
                name: column.name.clone(),
                kind: column.kind,
                value: reading
                    .filter(|v| v.is_finite())
                    .map_or(Value::Absent, Value::Numeric),
            }
        })
        .collect();
    Ok(Record::new(timestamp, tick, samples))
}
