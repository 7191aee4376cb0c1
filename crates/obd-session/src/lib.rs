//! OBD-II Session Layer
//!
//! Parameter catalog, the reading data model ([`Value`], [`Sample`],
//! [`Record`]), the [`Session`] that owns a live adapter link, and the
//! [`RecordSink`] seam through which records reach their consumers.

mod catalog;
mod error;
mod record;
mod session;
mod sink;

pub use catalog::{
    Parameter, ParameterCatalog, ParameterKind, LIVE_SENSORS, REPORT_SENSORS, VEHICLE_INFO,
};
pub use error::{CatalogError, SessionError};
pub use record::{Record, Sample, Value};
pub use session::Session;
pub use sink::{RecordSink, SinkError};
