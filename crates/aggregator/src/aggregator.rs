//! Record Aggregation
//!
//! Folds a record stream into per-parameter running statistics. Feeding the
//! same records in the same order always yields the same snapshot, whether
//! they arrive live from the sampler or are replayed from a log.

use obd_session::{ParameterKind, Record, RecordSink, SinkError, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::running::{RunningStat, StatSnapshot};

/// Per-parameter aggregation snapshot
pub type Snapshot = BTreeMap<String, StatSnapshot>;

/// Running statistics for every numeric parameter seen
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    stats: BTreeMap<String, RunningStat>,
    /// Last text value per text parameter
    last_text: BTreeMap<String, String>,
    records: u64,
}

impl Aggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record in
    ///
    /// Absent numeric samples register the parameter without counting, so a
    /// parameter that never answered still shows up with an undefined average.
    pub fn observe(&mut self, record: &Record) {
        self.records += 1;
        for sample in &record.samples {
            match (sample.kind, &sample.value) {
                (ParameterKind::Numeric, Value::Numeric(v)) if v.is_finite() => {
                    self.stats.entry(sample.name.clone()).or_default().push(*v);
                }
                (ParameterKind::Numeric, _) => {
                    self.stats.entry(sample.name.clone()).or_default();
                }
                (ParameterKind::Text, Value::Text(text)) => {
                    self.last_text.insert(sample.name.clone(), text.clone());
                }
                (ParameterKind::Text, _) => {}
            }
        }
        trace!("Observed record {} ({} total)", record.tick, self.records);
    }

    /// Current min/max/average per numeric parameter
    pub fn snapshot(&self) -> Snapshot {
        self.stats
            .iter()
            .map(|(name, stat)| (name.clone(), stat.snapshot()))
            .collect()
    }

    /// Statistics for one parameter
    pub fn stat(&self, name: &str) -> Option<&RunningStat> {
        self.stats.get(name)
    }

    /// Last seen value of each text parameter
    pub fn last_text(&self) -> &BTreeMap<String, String> {
        &self.last_text
    }

    /// Number of records observed
    pub fn records_observed(&self) -> u64 {
        self.records
    }
}

/// Aggregator shared between the sampler and readers
///
/// Updates touch four fields per parameter, so every access is serialized
/// through one mutex. Snapshots can be taken while a run is in progress.
#[derive(Debug, Clone, Default)]
pub struct SharedAggregator {
    inner: Arc<Mutex<Aggregator>>,
}

impl SharedAggregator {
    /// Create an empty shared aggregator
    pub fn new() -> Self {
        Self::default()
    }

    // observe() never panics part-way through, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, Aggregator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold one record in
    pub fn observe(&self, record: &Record) {
        self.lock().observe(record);
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    /// Last seen value of each text parameter
    pub fn last_text(&self) -> BTreeMap<String, String> {
        self.lock().last_text().clone()
    }

    /// Number of records observed
    pub fn records_observed(&self) -> u64 {
        self.lock().records_observed()
    }

    /// Copy of the current aggregator state
    pub fn to_aggregator(&self) -> Aggregator {
        self.lock().clone()
    }
}

impl RecordSink for SharedAggregator {
    fn name(&self) -> &str {
        "aggregator"
    }

    fn accept(&mut self, record: &Record) -> Result<(), SinkError> {
        self.observe(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use obd_protocol::{pid, QueryId};
    use obd_session::{Parameter, Sample};
    use proptest::prelude::*;

    fn record(tick: u64, rpm: Value, speed: Value) -> Record {
        let rpm_param = Parameter::numeric("RPM", QueryId::current(pid::RPM));
        let speed_param = Parameter::numeric("Speed", QueryId::current(pid::SPEED));
        Record::new(
            Utc::now(),
            tick,
            vec![Sample::new(&rpm_param, rpm), Sample::new(&speed_param, speed)],
        )
    }

    #[test]
    fn test_example_scenario() {
        let mut aggregator = Aggregator::new();
        aggregator.observe(&record(0, Value::Numeric(800.0), Value::Numeric(0.0)));
        aggregator.observe(&record(1, Value::Numeric(820.0), Value::Numeric(5.0)));
        aggregator.observe(&record(2, Value::Absent, Value::Numeric(7.0)));

        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot["RPM"],
            StatSnapshot {
                min: Some(800.0),
                max: Some(820.0),
                average: Some(810.0),
                count: 2
            }
        );
        assert_eq!(
            snapshot["Speed"],
            StatSnapshot {
                min: Some(0.0),
                max: Some(7.0),
                average: Some(4.0),
                count: 3
            }
        );
    }

    #[test]
    fn test_all_absent_has_undefined_average() {
        let mut aggregator = Aggregator::new();
        for tick in 0..5 {
            aggregator.observe(&record(tick, Value::Absent, Value::Numeric(1.0)));
        }
        let rpm = aggregator.snapshot()["RPM"];
        assert_eq!(rpm.count, 0);
        assert_eq!(rpm.average, None);
        assert_eq!(rpm.min, None);
    }

    #[test]
    fn test_non_finite_readings_count_as_absent() {
        let mut aggregator = Aggregator::new();
        aggregator.observe(&record(0, Value::Numeric(800.0), Value::Numeric(f64::INFINITY)));
        aggregator.observe(&record(1, Value::Numeric(f64::NAN), Value::Numeric(f64::NEG_INFINITY)));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot["RPM"].count, 1);
        assert_eq!(snapshot["RPM"].average, Some(800.0));
        assert_eq!(snapshot["Speed"].count, 0);
        assert_eq!(snapshot["Speed"].average, None);
    }

    #[test]
    fn test_text_parameters_not_aggregated() {
        let vin = Parameter::text("VIN", QueryId::vehicle_info(pid::VIN));
        let mut aggregator = Aggregator::new();
        aggregator.observe(&Record::new(
            Utc::now(),
            0,
            vec![Sample::new(&vin, Value::Text("WVW1".into()))],
        ));
        aggregator.observe(&Record::new(
            Utc::now(),
            1,
            vec![Sample::new(&vin, Value::Absent)],
        ));

        assert!(aggregator.snapshot().is_empty());
        assert_eq!(aggregator.last_text()["VIN"], "WVW1");
        assert_eq!(aggregator.records_observed(), 2);
    }

    #[test]
    fn test_shared_snapshot_during_ingestion() {
        let shared = SharedAggregator::new();
        let mut sink = shared.clone();
        sink.accept(&record(0, Value::Numeric(1000.0), Value::Absent)).unwrap();
        assert_eq!(shared.snapshot()["RPM"].count, 1);
        sink.accept(&record(1, Value::Numeric(3000.0), Value::Absent)).unwrap();
        assert_eq!(shared.snapshot()["RPM"].average, Some(2000.0));
        assert_eq!(shared.records_observed(), 2);
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            3 => (-1.0e6f64..1.0e6).prop_map(Value::Numeric),
            1 => Just(Value::Absent),
        ]
    }

    proptest! {
        #[test]
        fn prop_order_does_not_change_extremes_or_counts(
            values in proptest::collection::vec((value_strategy(), value_strategy()), 1..200)
        ) {
            let records: Vec<Record> = values
                .into_iter()
                .enumerate()
                .map(|(i, (rpm, speed))| record(i as u64, rpm, speed))
                .collect();

            let mut forward = Aggregator::new();
            records.iter().for_each(|r| forward.observe(r));
            let mut reverse = Aggregator::new();
            records.iter().rev().for_each(|r| reverse.observe(r));

            let forward = forward.snapshot();
            let reverse = reverse.snapshot();
            prop_assert_eq!(forward.len(), reverse.len());
            for (name, stat) in &forward {
                prop_assert!(stat.approx_eq(&reverse[name], 1e-9), "{}: {:?} vs {:?}", name, stat, reverse[name]);
            }
        }

        #[test]
        fn prop_count_matches_non_absent(
            values in proptest::collection::vec(value_strategy(), 0..200)
        ) {
            let expected = values.iter().filter(|v| !v.is_absent()).count() as u64;
            let mut aggregator = Aggregator::new();
            for (i, v) in values.into_iter().enumerate() {
                aggregator.observe(&record(i as u64, v.clone(), v));
            }
            if let Some(stat) = aggregator.stat("RPM") {
                prop_assert_eq!(stat.count(), expected);
                for v in [stat.min(), stat.max(), stat.average()].into_iter().flatten() {
                    prop_assert!(v.is_finite());
                }
            } else {
                prop_assert_eq!(expected, 0);
            }
        }
    }
}
