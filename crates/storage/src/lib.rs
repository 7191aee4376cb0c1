//! Session Log Store
//!
//! Appends each record to a durable, line-oriented log file and replays log
//! files back into records for offline analysis.

mod format;
mod replay;
mod store;
mod writer;

pub use format::{Column, LogFormat};
pub use replay::{Analysis, MalformedEntry, Replay};
pub use store::{Durability, LogStore};
pub use writer::LogWriter;

use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported log format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Invalid log header in {}: {reason}", .path.display())]
    InvalidHeader { path: PathBuf, reason: String },
    #[error("Record does not match log schema: {0}")]
    SchemaMismatch(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Log writer is closed")]
    Closed,
}
