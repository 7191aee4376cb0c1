//! Test utilities for adapter consumers
//!
//! [`ScriptedAdapter`] replays a fixed script of responses per query so that
//! sessions, samplers, and reports can be tested without hardware.
//!
//! ```ignore
//! use obd_protocol::testing::{ScriptedAdapter, Step};
//!
//! let adapter = ScriptedAdapter::new()
//!     .script(QueryId::current(pid::RPM), [Step::number(800.0), Step::null()]);
//! let probe = adapter.probe();
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapter::{Adapter, Reading};
use crate::error::ObdError;
use crate::query::QueryId;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum Step {
    /// Adapter answers with a reading
    Reading(Reading),
    /// Adapter answers "NO DATA"
    Null,
    /// Adapter fails the request
    Fail(ObdError),
    /// Adapter takes this long, then answers with the inner step
    Delay(Duration, Box<Step>),
}

impl Step {
    /// Numeric reading
    pub fn number(value: f64) -> Self {
        Step::Reading(Reading::Number(value))
    }

    /// Text reading
    pub fn text(value: &str) -> Self {
        Step::Reading(Reading::Text(value.to_string()))
    }

    /// Null reading
    pub fn null() -> Self {
        Step::Null
    }

    /// Delay the inner step
    pub fn delayed(delay: Duration, step: Step) -> Self {
        Step::Delay(delay, Box::new(step))
    }
}

/// Shared counters observed by tests after the adapter was moved into a session
#[derive(Debug, Clone, Default)]
pub struct AdapterProbe {
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    round_trips: Arc<Mutex<Vec<QueryId>>>,
}

impl AdapterProbe {
    /// Number of `connect` calls
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `close` calls that reached the adapter
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Most links that were open at the same time
    ///
    /// Only meaningful when several adapters share one probe, see
    /// [`ScriptedAdapter::with_probe`].
    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    fn link_opened(&self) {
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);
    }

    fn link_closed(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    /// Every query that reached the adapter, in order
    pub fn round_trips(&self) -> Vec<QueryId> {
        self.round_trips.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of round trips for one query
    pub fn round_trips_for(&self, id: &QueryId) -> usize {
        self.round_trips().iter().filter(|q| *q == id).count()
    }
}

/// Adapter answering from per-query scripts
///
/// Each query pops the next step of its script. An exhausted script answers
/// with the last step again; a query with no script answers null.
pub struct ScriptedAdapter {
    scripts: HashMap<QueryId, VecDeque<Step>>,
    last: HashMap<QueryId, Step>,
    supported: Option<HashSet<QueryId>>,
    fault_codes: Option<Vec<String>>,
    connect_error: Option<ObdError>,
    connect_delay: Option<Duration>,
    reports_connected: bool,
    /// Link drops after this many round trips
    drop_after: Option<usize>,
    connected: bool,
    /// Counted as open on the probe
    link_open: bool,
    probe: AdapterProbe,
}

impl ScriptedAdapter {
    /// Create an adapter with no scripts
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            last: HashMap::new(),
            supported: None,
            fault_codes: None,
            connect_error: None,
            connect_delay: None,
            reports_connected: true,
            drop_after: None,
            connected: false,
            link_open: false,
            probe: AdapterProbe::default(),
        }
    }

    /// Script the answers for one query
    pub fn script(mut self, id: QueryId, steps: impl IntoIterator<Item = Step>) -> Self {
        self.scripts.insert(id, steps.into_iter().collect());
        self
    }

    /// Restrict the supported set (default: every scripted query)
    pub fn supported(mut self, ids: impl IntoIterator<Item = QueryId>) -> Self {
        self.supported = Some(ids.into_iter().collect());
        self
    }

    /// Stored trouble codes
    pub fn fault_codes(mut self, codes: &[&str]) -> Self {
        self.fault_codes = Some(codes.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Make `connect` fail
    pub fn fail_connect(mut self, error: ObdError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// Make `connect` take this long
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Report into a shared probe, e.g. one per adapter factory
    pub fn with_probe(mut self, probe: AdapterProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Make `connect` succeed but report the vehicle as not connected
    pub fn not_connected(mut self) -> Self {
        self.reports_connected = false;
        self
    }

    /// Drop the link after `round_trips` successful queries
    pub fn drop_after(mut self, round_trips: usize) -> Self {
        self.drop_after = Some(round_trips);
        self
    }

    /// Counters that stay readable after the adapter is moved
    pub fn probe(&self) -> AdapterProbe {
        self.probe.clone()
    }

    fn next_step(&mut self, id: &QueryId) -> Step {
        if let Some(step) = self.scripts.get_mut(id).and_then(|s| s.pop_front()) {
            self.last.insert(id.clone(), step.clone());
            return step;
        }
        self.last.get(id).cloned().unwrap_or(Step::Null)
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn connect(&mut self) -> Result<(), ObdError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        self.probe.link_opened();
        self.link_open = true;
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.connect_error.clone() {
            self.probe.link_closed();
            self.link_open = false;
            return Err(err);
        }
        self.connected = self.reports_connected;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn supported_queries(&mut self) -> Result<HashSet<QueryId>, ObdError> {
        Ok(self
            .supported
            .clone()
            .unwrap_or_else(|| self.scripts.keys().cloned().collect()))
    }

    async fn query(&mut self, id: &QueryId) -> Result<Option<Reading>, ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }

        let trips = {
            let mut round_trips = self
                .probe
                .round_trips
                .lock()
                .map_err(|e| ObdError::Transport(format!("probe lock poisoned: {}", e)))?;
            round_trips.push(id.clone());
            round_trips.len()
        };
        if self.drop_after.is_some_and(|limit| trips > limit) {
            self.connected = false;
            return Err(ObdError::Transport("link dropped".to_string()));
        }

        let mut step = self.next_step(id);
        loop {
            match step {
                Step::Reading(reading) => return Ok(Some(reading)),
                Step::Null => return Ok(None),
                Step::Fail(err) => return Err(err),
                Step::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
            }
        }
    }

    async fn read_fault_codes(&mut self) -> Result<Option<Vec<String>>, ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }
        Ok(self.fault_codes.clone())
    }

    async fn clear_fault_codes(&mut self) -> Result<(), ObdError> {
        if !self.connected {
            return Err(ObdError::Closed);
        }
        self.fault_codes = None;
        Ok(())
    }

    async fn close(&mut self) {
        if std::mem::take(&mut self.link_open) {
            self.probe.link_closed();
        }
        self.connected = false;
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
    }
}
