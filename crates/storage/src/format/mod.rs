//! Log file formats
//!
//! Two line-oriented encodings of the same logical schema: a header naming
//! every parameter (with its kind) in catalog order, then one entry per
//! record. Both keep numbers bit-exact and keep `Absent` apart from `0` and
//! from the empty string.

pub(crate) mod csv;
pub(crate) mod jsonl;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use obd_session::{Parameter, ParameterKind, Record};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported log file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Comma-separated values, one row per record
    #[default]
    Csv,
    /// One JSON object per line
    #[serde(alias = "json")]
    Jsonl,
}

impl LogFormat {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(LogFormat::Csv),
            "jsonl" | "ndjson" => Some(LogFormat::Jsonl),
            _ => None,
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Csv => "csv",
            LogFormat::Jsonl => "jsonl",
        }
    }

    /// Header lines, each terminated by a newline
    pub(crate) fn encode_header(&self, columns: &[Column]) -> Result<String, String> {
        match self {
            LogFormat::Csv => Ok(csv::encode_header(columns)),
            LogFormat::Jsonl => jsonl::encode_header(columns),
        }
    }

    /// One entry, terminated by a newline
    ///
    /// Non-finite numbers are refused: neither format reads them back as the
    /// value that was written.
    pub(crate) fn encode_entry(&self, record: &Record) -> Result<String, String> {
        if let Some(sample) = record
            .samples
            .iter()
            .find(|s| s.value.as_f64().is_some_and(|v| !v.is_finite()))
        {
            return Err(format!("{}: non-finite value cannot be logged", sample.name));
        }
        match self {
            LogFormat::Csv => Ok(csv::encode_entry(record)),
            LogFormat::Jsonl => jsonl::encode_entry(record),
        }
    }
}

/// Older JSON logs, written as a single array of entries
pub(crate) fn is_array_log(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// One logged parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ParameterKind,
}

impl From<&Parameter> for Column {
    fn from(parameter: &Parameter) -> Self {
        Self {
            name: parameter.name.clone(),
            kind: parameter.kind,
        }
    }
}

/// Format a record timestamp
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a record timestamp
///
/// Accepts RFC 3339 and, for older logs, naive ISO-8601 local stamps which
/// are taken as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid timestamp {:?}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_detection() {
        assert_eq!(LogFormat::from_extension(Path::new("log.csv")), Some(LogFormat::Csv));
        assert_eq!(LogFormat::from_extension(Path::new("log.JSONL")), Some(LogFormat::Jsonl));
        assert_eq!(LogFormat::from_extension(Path::new("log.txt")), None);
        assert_eq!(LogFormat::from_extension(Path::new("log")), None);
        assert_eq!(LogFormat::from_extension(Path::new("log.json")), None);
        assert!(is_array_log(Path::new("obd_log_20231105_100000.json")));
        assert!(!is_array_log(Path::new("log.jsonl")));
    }

    #[test]
    fn test_timestamp_parsing() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
        assert!(parse_timestamp("2024-03-01T12:30:05.250000").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
