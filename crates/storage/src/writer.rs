//! Durable log writer

use metrics::counter;
use obd_session::{ParameterKind, Record, RecordSink, SinkError, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Span};

use crate::format::{Column, LogFormat};
use crate::store::Durability;
use crate::StorageError;

/// Appends records to one log file
///
/// Every [`LogWriter::append`] reaches the file (and, under
/// [`Durability::Sync`], the disk) before it returns.
pub struct LogWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    format: LogFormat,
    columns: Vec<Column>,
    durability: Durability,
    entries: u64,
    span: Span,
}

impl LogWriter {
    /// Wrap a freshly created file and write the header
    pub(crate) fn create(
        file: File,
        path: PathBuf,
        format: LogFormat,
        columns: Vec<Column>,
        durability: Durability,
        span: Span,
    ) -> Result<Self, StorageError> {
        let mut writer = Self {
            path,
            writer: Some(BufWriter::new(file)),
            format,
            columns,
            durability,
            entries: 0,
            span,
        };
        let header = format
            .encode_header(&writer.columns)
            .map_err(StorageError::SerializationError)?;
        writer.write_durably(header.as_bytes())?;
        info!(parent: &writer.span, "Logging {} parameters to {}", writer.columns.len(), writer.path.display());
        Ok(writer)
    }

    fn write_durably(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let writer = self.writer.as_mut().ok_or(StorageError::Closed)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        if self.durability == Durability::Sync {
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Every sample must sit in its own column with a value of that column's kind
    fn check_schema(&self, record: &Record) -> Result<(), StorageError> {
        if record.samples.len() != self.columns.len() {
            return Err(StorageError::SchemaMismatch(format!(
                "tick {} has {} samples for {} columns",
                record.tick,
                record.samples.len(),
                self.columns.len()
            )));
        }
        for (sample, column) in record.samples.iter().zip(&self.columns) {
            if sample.name != column.name || sample.kind != column.kind {
                return Err(StorageError::SchemaMismatch(format!(
                    "tick {}: sample {} does not belong in column {}",
                    record.tick, sample.name, column.name
                )));
            }
            let fits = matches!(
                (column.kind, &sample.value),
                (_, Value::Absent)
                    | (ParameterKind::Numeric, Value::Numeric(_))
                    | (ParameterKind::Text, Value::Text(_))
            );
            if !fits {
                return Err(StorageError::SchemaMismatch(format!(
                    "tick {}: {} holds a value of the wrong kind for a {:?} column",
                    record.tick, sample.name, column.kind
                )));
            }
        }
        Ok(())
    }

    /// Append one record
    pub fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        self.check_schema(record)?;

        let line = self
            .format
            .encode_entry(record)
            .map_err(StorageError::SerializationError)?;
        self.write_durably(line.as_bytes())?;
        self.entries += 1;
        counter!("storage_entries_written_total").increment(1);
        debug!(parent: &self.span, "Appended tick {}", record.tick);
        Ok(())
    }

    /// Flush, sync, and close the file; later calls are no-ops
    pub fn close(&mut self) -> Result<(), StorageError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            info!(parent: &self.span, "Closed {} after {} entries", self.path.display(), self.entries);
        }
        Ok(())
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log format
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Number of entries written
    pub fn entries(&self) -> u64 {
        self.entries
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(parent: &self.span, "Closing {} failed: {}", self.path.display(), err);
        }
    }
}

impl RecordSink for LogWriter {
    fn name(&self) -> &str {
        "log-store"
    }

    fn accept(&mut self, record: &Record) -> Result<(), SinkError> {
        self.append(record)
            .map_err(|e| SinkError::new("log-store", e.to_string()))
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.close()
            .map_err(|e| SinkError::new("log-store", e.to_string()))
    }
}
