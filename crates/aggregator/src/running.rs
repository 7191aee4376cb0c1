//! Incremental Statistics

use serde::{Deserialize, Serialize};

/// Min/max/sum/count accumulator for one numeric parameter
///
/// `min` and `max` are meaningless while `count == 0`; use the accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStat {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl RunningStat {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    /// Fold one observation in
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Smallest observed value
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest observed value
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Sum of observed values
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean, `None` when nothing was observed
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Read-only view
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            min: self.min(),
            max: self.max(),
            average: self.average(),
            count: self.count,
        }
    }
}

impl Default for RunningStat {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a [`RunningStat`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub count: u64,
}

impl StatSnapshot {
    /// Compare two snapshots allowing for floating point rounding in the average
    pub fn approx_eq(&self, other: &StatSnapshot, tolerance: f64) -> bool {
        let close = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0),
            (None, None) => true,
            _ => false,
        };
        self.count == other.count
            && self.min == other.min
            && self.max == other.max
            && close(self.average, other.average)
    }
}
