//! OBD-II Sampler
//!
//! Polls a fixed parameter list on a clock-aligned interval, turns every tick
//! into a [`Record`](obd_session::Record), and pushes it to the registered
//! sinks and observers. The [`Monitor`] runs one sampler at a time in the
//! background and exposes start/stop/status controls.

mod cancel;
mod error;
mod monitor;
mod sampler;

pub use cancel::{CancelToken, Canceller};
pub use error::{MonitorError, SamplerError};
pub use monitor::{Monitor, MonitorRequest, MonitorStatus};
pub use sampler::{RunSummary, Sampler, SamplerConfig, StopReason};
