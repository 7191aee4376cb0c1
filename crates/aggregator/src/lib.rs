//! Reading Aggregation
//!
//! Incremental min/max/average statistics over OBD-II records, usable online
//! (fed by the sampler) and offline (fed by a log replay).

mod aggregator;
mod running;

pub use aggregator::{Aggregator, SharedAggregator, Snapshot};
pub use running::{RunningStat, StatSnapshot};
