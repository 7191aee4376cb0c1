//! Log replay
//!
//! Reads a log back into records, lazily and in write order. Entries that do
//! not parse are skipped with a warning and counted; only a missing file, an
//! unreadable header, or an I/O failure stops a replay.
//!
//! Replayed records are numbered by their position among the readable
//! entries, so ticks stay contiguous across skipped entries.

use aggregator::Snapshot;
use metrics::counter;
use obd_session::{ParameterKind, Record};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info_span, warn, Span};

use crate::format::{self, csv, jsonl, Column, LogFormat};
use crate::StorageError;

/// An entry skipped during replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedEntry {
    /// 1-based line number in the file; the 1-based element position for
    /// legacy JSON array logs
    pub line: usize,
    /// Why the entry was rejected
    pub reason: String,
}

enum Source {
    /// Line-oriented logs, read lazily
    Lines(BufReader<File>),
    /// Legacy JSON array logs, parsed when opened
    Array(std::vec::IntoIter<serde_json::Value>),
}

/// Lazy iterator over the records of one log file
pub struct Replay {
    path: PathBuf,
    source: Source,
    format: LogFormat,
    columns: Vec<Column>,
    /// CSV without a kind row, or a JSON array log
    legacy: bool,
    /// Line read while probing the header that turned out to be data
    pending: Option<String>,
    line_no: usize,
    ordinal: u64,
    malformed: Vec<MalformedEntry>,
    error: Option<io::Error>,
    span: Span,
}

impl Replay {
    /// Open a log file and read its header
    ///
    /// The format is chosen from the file extension; `.json` is read as a
    /// legacy array log. Calling `open` again on the same path restarts the
    /// replay from the first entry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let array_log = format::is_array_log(&path);
        let format = match LogFormat::from_extension(&path) {
            Some(format) => format,
            None if array_log => LogFormat::Jsonl,
            None => return Err(StorageError::UnsupportedFormat(path)),
        };
        let file = File::open(&path)?;
        let span = info_span!("replay", path = %path.display());

        let mut replay = Self {
            path,
            source: Source::Lines(BufReader::new(file)),
            format,
            columns: Vec::new(),
            legacy: false,
            pending: None,
            line_no: 0,
            ordinal: 0,
            malformed: Vec::new(),
            error: None,
            span,
        };
        if array_log {
            replay.read_array()?;
        } else {
            replay.read_header()?;
        }
        debug!(parent: &replay.span, "Replaying {} columns (legacy: {})", replay.columns.len(), replay.legacy);
        Ok(replay)
    }

    fn invalid_header(&self, reason: impl Into<String>) -> StorageError {
        StorageError::InvalidHeader {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn read_header(&mut self) -> Result<(), StorageError> {
        let first = self
            .read_line()?
            .ok_or_else(|| self.invalid_header("empty log"))?;

        match self.format {
            LogFormat::Csv => {
                let names = csv::parse_header(&first).map_err(|r| self.invalid_header(r))?;
                let second = self.read_line()?;
                match second.as_deref().and_then(|line| csv::parse_kinds(line, &names)) {
                    Some(columns) => self.columns = columns,
                    None => {
                        self.legacy = true;
                        self.pending = second;
                        self.columns = names
                            .into_iter()
                            .map(|name| Column {
                                name,
                                kind: ParameterKind::Numeric,
                            })
                            .collect();
                    }
                }
            }
            LogFormat::Jsonl => {
                self.columns = jsonl::parse_header(&first).map_err(|r| self.invalid_header(r))?;
            }
        }
        Ok(())
    }

    fn read_array(&mut self) -> Result<(), StorageError> {
        let parsed = match &mut self.source {
            Source::Lines(reader) => serde_json::from_reader::<_, serde_json::Value>(reader),
            Source::Array(_) => return Ok(()),
        };
        let entries = match parsed {
            Ok(serde_json::Value::Array(entries)) => entries,
            Ok(_) => return Err(self.invalid_header("expected an array of entries")),
            Err(err) if err.is_io() => return Err(StorageError::Io(err.into())),
            Err(err) => return Err(self.invalid_header(format!("not a JSON log: {}", err))),
        };
        self.columns = jsonl::legacy_columns(&entries);
        self.legacy = true;
        self.source = Source::Array(entries.into_iter());
        Ok(())
    }

    /// Next physical line without its terminator
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let Source::Lines(reader) = &mut self.source else {
            return Ok(None);
        };
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    fn decode(&self, line: &str, tick: u64) -> Result<Record, String> {
        match self.format {
            LogFormat::Csv => csv::decode_entry(line, &self.columns, self.legacy, tick),
            LogFormat::Jsonl => jsonl::decode_entry(line, &self.columns, tick),
        }
    }

    /// Number a decoded entry, or record why it was skipped
    fn settle(&mut self, decoded: Result<Record, String>) -> Option<Record> {
        match decoded {
            Ok(record) => {
                self.ordinal += 1;
                Some(record)
            }
            Err(reason) => {
                warn!(parent: &self.span, "Skipping malformed entry at line {}: {}", self.line_no, reason);
                counter!("storage_replay_skipped_total").increment(1);
                self.malformed.push(MalformedEntry {
                    line: self.line_no,
                    reason,
                });
                None
            }
        }
    }

    /// Columns declared by the header, in catalog order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Log format
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Entries skipped so far
    pub fn skipped(&self) -> usize {
        self.malformed.len()
    }

    /// Details of the entries skipped so far
    pub fn malformed(&self) -> &[MalformedEntry] {
        &self.malformed
    }

    /// I/O error that ended the replay early, if any
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl Iterator for Replay {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Source::Array(entries) = &mut self.source {
                let entry = entries.next()?;
                self.line_no += 1;
                let decoded = jsonl::decode_legacy_entry(&entry, &self.columns, self.ordinal);
                match self.settle(decoded) {
                    Some(record) => return Some(record),
                    None => continue,
                }
            }

            let line = match self.pending.take() {
                Some(line) => line,
                None => match self.read_line() {
                    Ok(Some(line)) => line,
                    Ok(None) => return None,
                    Err(err) => {
                        error!(parent: &self.span, "Replay stopped at line {}: {}", self.line_no, err);
                        self.error = Some(err);
                        return None;
                    }
                },
            };
            if line.trim().is_empty() {
                continue;
            }

            let decoded = self.decode(&line, self.ordinal);
            if let Some(record) = self.settle(decoded) {
                return Some(record);
            }
        }
    }
}

/// Offline analysis of one log file
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    /// Analyzed file
    pub path: PathBuf,
    /// Per-parameter statistics
    pub stats: Snapshot,
    /// Last value of each text parameter
    pub last_text: BTreeMap<String, String>,
    /// Entries aggregated
    pub entries: u64,
    /// Entries skipped as malformed
    pub skipped: usize,
    /// Why each skipped entry was rejected
    pub malformed: Vec<MalformedEntry>,
}
