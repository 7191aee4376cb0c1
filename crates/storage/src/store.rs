//! Log directory management

use aggregator::Aggregator;
use chrono::{DateTime, Utc};
use obd_session::Parameter;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

use crate::format::{self, Column, LogFormat};
use crate::replay::{Analysis, Replay};
use crate::writer::LogWriter;
use crate::StorageError;

/// How far an appended entry must get before `append` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Flushed to the operating system
    Flush,
    /// Flushed and synced to disk
    #[default]
    Sync,
}

/// Directory of session logs
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    format: LogFormat,
    durability: Durability,
}

impl LogStore {
    /// Open (creating if needed) a log directory
    pub fn new(dir: impl Into<PathBuf>, format: LogFormat) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            format,
            durability: Durability::default(),
        })
    }

    /// Builder: set durability
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Format used for new logs
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Start a new log for the given parameters
    pub fn create(&self, parameters: &[Parameter]) -> Result<LogWriter, StorageError> {
        self.create_at(Utc::now(), parameters)
    }

    /// Start a new log named after `started`
    ///
    /// Names never collide with an existing file: a numeric suffix is added
    /// when two logs start within the same millisecond.
    pub fn create_at(
        &self,
        started: DateTime<Utc>,
        parameters: &[Parameter],
    ) -> Result<LogWriter, StorageError> {
        let stem = started.format("obd_log_%Y%m%d_%H%M%S_%3f").to_string();
        let (file, path) = self.create_unique(&stem)?;
        let columns: Vec<Column> = parameters.iter().map(Column::from).collect();
        let span = info_span!("log", file = %path.display());
        LogWriter::create(file, path, self.format, columns, self.durability, span)
    }

    fn create_unique(&self, stem: &str) -> Result<(File, PathBuf), StorageError> {
        let ext = self.format.extension();
        let mut suffix = 0u32;
        loop {
            let name = match suffix {
                0 => format!("{}.{}", stem, ext),
                n => format!("{}_{}.{}", stem, n, ext),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((file, path)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Log files in the directory, oldest name first
    pub fn list(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let readable = LogFormat::from_extension(&path).is_some() || format::is_array_log(&path);
            if path.is_file() && readable {
                logs.push(path);
            }
        }
        logs.sort();
        Ok(logs)
    }

    /// Resolve a name relative to the log directory; absolute paths pass through
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.dir.join(path)
    }

    /// Replay a log file
    pub fn replay(path: impl AsRef<Path>) -> Result<Replay, StorageError> {
        Replay::open(path)
    }

    /// Aggregate a whole log file
    pub fn analyze(path: impl AsRef<Path>) -> Result<Analysis, StorageError> {
        let path = path.as_ref();
        let mut replay = Replay::open(path)?;
        let mut aggregator = Aggregator::new();
        for record in replay.by_ref() {
            aggregator.observe(&record);
        }
        if let Some(err) = replay.take_error() {
            return Err(err.into());
        }

        info!(
            "Analyzed {}: {} entries, {} skipped",
            path.display(),
            aggregator.records_observed(),
            replay.skipped()
        );
        Ok(Analysis {
            path: path.to_path_buf(),
            stats: aggregator.snapshot(),
            last_text: aggregator.last_text().clone(),
            entries: aggregator.records_observed(),
            skipped: replay.skipped(),
            malformed: replay.malformed().to_vec(),
        })
    }
}
