//! Background monitoring control surface

use obd_session::{Parameter, Record, RecordSink, Session};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::cancel::Canceller;
use crate::error::{MonitorError, SamplerError};
use crate::sampler::{RunSummary, Sampler, SamplerConfig};

/// Records buffered per observer before it starts lagging
const OBSERVER_CAPACITY: usize = 64;

/// What the monitor is doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum MonitorStatus {
    Idle,
    Running,
    /// The last run aborted
    Error(String),
}

/// Parameters and timing for one run
#[derive(Debug, Clone)]
pub struct MonitorRequest {
    pub parameters: Vec<Parameter>,
    pub config: SamplerConfig,
}

struct MonitorState {
    status: MonitorStatus,
    last_summary: Option<RunSummary>,
    canceller: Option<Canceller>,
    handle: Option<JoinHandle<Result<RunSummary, SamplerError>>>,
}

impl MonitorState {
    /// A run that ends normally leaves `Running` itself; one still marked
    /// running after its task finished has panicked or was aborted.
    fn reap(&mut self) {
        let finished = self.handle.as_ref().is_some_and(JoinHandle::is_finished);
        if finished && self.status == MonitorStatus::Running {
            self.status = MonitorStatus::Error("sampling task ended unexpectedly".to_string());
            self.canceller = None;
        }
    }
}

/// Runs at most one sampler at a time in a background task
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    observers: broadcast::Sender<Arc<Record>>,
    span: Span,
}

impl Monitor {
    /// Create an idle monitor
    pub fn new() -> Self {
        Self::new_in(&Span::current())
    }

    /// Create an idle monitor logging under the given parent span
    pub fn new_in(parent: &Span) -> Self {
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                status: MonitorStatus::Idle,
                last_summary: None,
                canceller: None,
                handle: None,
            })),
            observers,
            span: info_span!(parent: parent, "monitor"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reap();
        state
    }

    /// Receive every record of every later run
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Record>> {
        self.observers.subscribe()
    }

    /// Start sampling in the background
    ///
    /// The session is closed if the monitor is already running or the request
    /// is invalid.
    pub async fn start(
        &self,
        mut session: Session,
        request: MonitorRequest,
        sinks: Vec<Box<dyn RecordSink>>,
    ) -> Result<(), MonitorError> {
        let sampler = match Sampler::new_in(request.parameters, request.config, &self.span) {
            Ok(sampler) => sampler,
            Err(err) => {
                session.close().await;
                return Err(err.into());
            }
        };
        let mut sampler = sampler.with_observers(self.observers.clone());
        for sink in sinks {
            sampler.add_sink(sink);
        }

        let rejected = {
            let mut state = self.lock();
            if state.status == MonitorStatus::Running {
                Some(session)
            } else {
                let canceller = Canceller::new();
                let token = canceller.token();
                let shared = Arc::clone(&self.state);
                let run = async move {
                    let result = sampler.run(session, token).await;
                    let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    match &result {
                        Ok(summary) => {
                            state.status = MonitorStatus::Idle;
                            state.last_summary = Some(summary.clone());
                        }
                        Err(err) => state.status = MonitorStatus::Error(err.to_string()),
                    }
                    result
                };

                state.status = MonitorStatus::Running;
                state.last_summary = None;
                state.canceller = Some(canceller);
                state.handle = Some(tokio::spawn(run.instrument(self.span.clone())));
                None
            }
        };

        if let Some(mut session) = rejected {
            warn!(parent: &self.span, "Start rejected, a run is already active");
            session.close().await;
            return Err(MonitorError::AlreadyRunning);
        }
        info!(parent: &self.span, "Monitoring started");
        Ok(())
    }

    /// Request the active run to stop; returns whether one was active
    pub fn stop(&self) -> bool {
        let state = self.lock();
        match (&state.status, &state.canceller) {
            (MonitorStatus::Running, Some(canceller)) => {
                canceller.cancel();
                info!(parent: &self.span, "Stop requested");
                true
            }
            _ => false,
        }
    }

    /// Current status
    pub fn status(&self) -> MonitorStatus {
        self.lock().status.clone()
    }

    /// Whether a run is active
    pub fn is_running(&self) -> bool {
        self.status() == MonitorStatus::Running
    }

    /// Summary of the last run that ended cleanly
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.lock().last_summary.clone()
    }

    /// Wait for the current run to end
    ///
    /// Returns `None` when no run was started since the last `wait`.
    pub async fn wait(&self) -> Option<Result<RunSummary, MonitorError>> {
        let handle = self.lock().handle.take()?;
        let result = match handle.await {
            Ok(result) => result.map_err(MonitorError::from),
            Err(err) => {
                let message = err.to_string();
                warn!(parent: &self.span, "Sampling task failed: {}", message);
                self.lock().status = MonitorStatus::Error(message.clone());
                Err(MonitorError::TaskFailed(message))
            }
        };
        Some(result)
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aggregator::SharedAggregator;
    use obd_protocol::testing::{ScriptedAdapter, Step};
    use obd_protocol::{pid, QueryId};
    use obd_session::Value;
    use std::time::Duration;

    fn rpm() -> Parameter {
        Parameter::numeric("RPM", QueryId::current(pid::RPM))
    }

    fn request(duration: Option<Duration>) -> MonitorRequest {
        let mut config = SamplerConfig::new(Duration::from_secs(1));
        config.duration = duration;
        MonitorRequest {
            parameters: vec![rpm()],
            config,
        }
    }

    fn adapter() -> ScriptedAdapter {
        ScriptedAdapter::new().script(QueryId::current(pid::RPM), [Step::number(800.0)])
    }

    async fn session(adapter: ScriptedAdapter) -> Session {
        Session::connect(Box::new(adapter)).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_cycle() {
        let monitor = Monitor::new();
        assert_eq!(monitor.status(), MonitorStatus::Idle);
        assert!(!monitor.stop());

        let adapter = adapter();
        let probe = adapter.probe();
        let aggregator = SharedAggregator::new();
        let mut records = monitor.subscribe();

        monitor
            .start(session(adapter).await, request(None), vec![Box::new(aggregator.clone())])
            .await
            .unwrap();
        assert!(monitor.is_running());

        let first = records.recv().await.unwrap();
        assert_eq!(first.get("RPM"), Some(&Value::Numeric(800.0)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(monitor.stop());
        let summary = monitor.wait().await.unwrap().unwrap();

        assert_eq!(summary.ticks, 2);
        assert_eq!(monitor.status(), MonitorStatus::Idle);
        assert_eq!(monitor.last_summary(), Some(summary));
        assert_eq!(aggregator.snapshot()["RPM"].count, 2);
        assert_eq!(probe.closes(), 1);
        assert!(monitor.wait().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_rejected() {
        let monitor = Monitor::new();
        monitor
            .start(session(adapter()).await, request(None), Vec::new())
            .await
            .unwrap();

        let second = adapter();
        let second_probe = second.probe();
        let err = monitor
            .start(session(second).await, request(None), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::AlreadyRunning));
        assert_eq!(second_probe.closes(), 1);

        monitor.stop();
        monitor.wait().await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ends_on_its_own() {
        let monitor = Monitor::new();
        monitor
            .start(
                session(adapter()).await,
                request(Some(Duration::from_secs(3))),
                Vec::new(),
            )
            .await
            .unwrap();

        let summary = monitor.wait().await.unwrap().unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(monitor.status(), MonitorStatus::Idle);
        assert!(!monitor.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_reports_error_status() {
        let monitor = Monitor::new();
        let flaky = adapter().drop_after(2);
        let probe = flaky.probe();
        monitor
            .start(session(flaky).await, request(None), Vec::new())
            .await
            .unwrap();

        let result = monitor.wait().await.unwrap();
        assert!(matches!(
            result,
            Err(MonitorError::Sampler(SamplerError::Connection(_)))
        ));
        assert!(matches!(monitor.status(), MonitorStatus::Error(_)));
        assert_eq!(probe.closes(), 1);

        // A failed run does not block the next one
        monitor
            .start(session(adapter()).await, request(Some(Duration::from_secs(1))), Vec::new())
            .await
            .unwrap();
        assert!(monitor.wait().await.unwrap().is_ok());
    }

    struct Exploding;

    impl RecordSink for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn accept(&mut self, _record: &Record) -> Result<(), obd_session::SinkError> {
            panic!("sink blew up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_run_frees_the_monitor() {
        let monitor = Monitor::new();
        monitor
            .start(session(adapter()).await, request(None), vec![Box::new(Exploding)])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(monitor.status(), MonitorStatus::Error(_)));
        assert!(!monitor.is_running());
        assert!(!monitor.stop());

        let result = monitor.wait().await.unwrap();
        assert!(matches!(result, Err(MonitorError::TaskFailed(_))));

        monitor
            .start(session(adapter()).await, request(Some(Duration::from_secs(1))), Vec::new())
            .await
            .unwrap();
        assert!(monitor.wait().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_request_closes_session() {
        let monitor = Monitor::new();
        let adapter = adapter();
        let probe = adapter.probe();
        let mut request = request(None);
        request.config.interval = Duration::ZERO;

        let err = monitor
            .start(session(adapter).await, request, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Sampler(SamplerError::InvalidInterval)));
        assert_eq!(probe.closes(), 1);
        assert_eq!(monitor.status(), MonitorStatus::Idle);
    }

    #[test]
    fn test_status_json_shape() {
        assert_eq!(
            serde_json::to_string(&MonitorStatus::Idle).unwrap(),
            r#"{"state":"idle"}"#
        );
        assert_eq!(
            serde_json::to_string(&MonitorStatus::Error("link lost".into())).unwrap(),
            r#"{"state":"error","message":"link lost"}"#
        );
    }
}
