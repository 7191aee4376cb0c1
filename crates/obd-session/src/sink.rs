//! Record Consumers
//!
//! The sampler pushes every record, in tick order, to each registered sink.
//! A sink error stops the run.

use thiserror::Error;

use crate::record::Record;

/// Error reported by a record sink
#[derive(Debug, Clone, Error)]
#[error("{sink}: {message}")]
pub struct SinkError {
    /// Sink name
    pub sink: String,
    /// What went wrong
    pub message: String,
}

impl SinkError {
    /// Create a sink error
    pub fn new(sink: &str, message: impl Into<String>) -> Self {
        Self {
            sink: sink.to_string(),
            message: message.into(),
        }
    }
}

/// Consumer of the record stream
pub trait RecordSink: Send {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Consume one record
    fn accept(&mut self, record: &Record) -> Result<(), SinkError>;

    /// Flush and release resources at the end of a run
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn accept(&mut self, record: &Record) -> Result<(), SinkError> {
        (**self).accept(record)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}
