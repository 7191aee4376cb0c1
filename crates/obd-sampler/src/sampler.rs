//! Polling loop

use chrono::{DateTime, Utc};
use metrics::counter;
use obd_session::{Parameter, Record, RecordSink, Sample, Session, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Span};

use crate::cancel::CancelToken;
use crate::error::SamplerError;

/// Timing for one sampling run
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Time between tick starts
    pub interval: Duration,
    /// Stop after this long; `None` runs until cancelled
    pub duration: Option<Duration>,
    /// Per-query limit; defaults to the interval
    pub query_timeout: Option<Duration>,
}

impl SamplerConfig {
    /// Run indefinitely at the given interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            duration: None,
            query_timeout: None,
        }
    }

    /// Builder: stop after `duration`
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder: per-query timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    fn query_timeout(&self) -> Duration {
        self.query_timeout.unwrap_or(self.interval)
    }
}

/// Why a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured duration elapsed
    DurationElapsed,
    /// Stop was requested
    Cancelled,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Records produced and delivered
    pub ticks: u64,
    /// Absent samples across all records
    pub absent_samples: u64,
    pub stop_reason: StopReason,
}

/// Polls a parameter list and fans records out
///
/// The sampler owns the [`Session`] for the length of a run and closes it on
/// every exit path.
pub struct Sampler {
    parameters: Vec<Parameter>,
    config: SamplerConfig,
    sinks: Vec<Box<dyn RecordSink>>,
    observers: Option<broadcast::Sender<Arc<Record>>>,
    span: Span,
}

impl Sampler {
    /// Create a sampler for the given parameters, in catalog order
    pub fn new(parameters: Vec<Parameter>, config: SamplerConfig) -> Result<Self, SamplerError> {
        Self::new_in(parameters, config, &Span::current())
    }

    /// Create a sampler logging under the given parent span
    pub fn new_in(
        parameters: Vec<Parameter>,
        config: SamplerConfig,
        parent: &Span,
    ) -> Result<Self, SamplerError> {
        if config.interval.is_zero() {
            return Err(SamplerError::InvalidInterval);
        }
        let span = info_span!(
            parent: parent,
            "sampler",
            interval_ms = config.interval.as_millis() as u64,
            parameters = parameters.len()
        );
        Ok(Self {
            parameters,
            config,
            sinks: Vec::new(),
            observers: None,
            span,
        })
    }

    /// Register a sink; sinks receive records in registration order
    pub fn add_sink(&mut self, sink: Box<dyn RecordSink>) {
        debug!(parent: &self.span, "Registered sink {}", sink.name());
        self.sinks.push(sink);
    }

    /// Builder: register a sink
    pub fn with_sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    /// Builder: broadcast every record to observers
    ///
    /// Delivery never waits; slow observers lag and miss records.
    pub fn with_observers(mut self, observers: broadcast::Sender<Arc<Record>>) -> Self {
        self.observers = Some(observers);
        self
    }

    /// Parameters polled each tick
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Poll until the duration elapses, cancellation, or a fatal error
    pub async fn run(
        mut self,
        mut session: Session,
        mut cancel: CancelToken,
    ) -> Result<RunSummary, SamplerError> {
        info!(parent: &self.span, "Sampling started");
        let outcome = self.poll(&mut session, &mut cancel).await;
        let finished = self.finish_sinks();
        session.close().await;

        match (outcome, finished) {
            (Ok(summary), Ok(())) => {
                info!(
                    parent: &self.span,
                    "Sampling stopped ({:?}) after {} ticks, {} absent samples",
                    summary.stop_reason,
                    summary.ticks,
                    summary.absent_samples
                );
                Ok(summary)
            }
            (Err(err), _) | (Ok(_), Err(err)) => {
                error!(parent: &self.span, "Sampling aborted: {}", err);
                Err(err)
            }
        }
    }

    async fn poll(
        &mut self,
        session: &mut Session,
        cancel: &mut CancelToken,
    ) -> Result<RunSummary, SamplerError> {
        let run_start = Instant::now();
        let wall_start = Utc::now();
        let deadline = self.config.duration.map(|d| run_start + d);

        let mut ticker = time::interval_at(run_start, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = 0u64;
        let mut absent_samples = 0u64;
        let summary = |ticks, absent_samples, stop_reason| RunSummary {
            ticks,
            absent_samples,
            stop_reason,
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(summary(ticks, absent_samples, StopReason::Cancelled));
                }
                _ = sleep_until_deadline(deadline) => {
                    return Ok(summary(ticks, absent_samples, StopReason::DurationElapsed));
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            if cancel.is_cancelled() {
                return Ok(summary(ticks, absent_samples, StopReason::Cancelled));
            }
            if deadline.is_some_and(|d| started >= d) {
                return Ok(summary(ticks, absent_samples, StopReason::DurationElapsed));
            }

            let timestamp = wall_clock(wall_start, started - run_start);
            let query_timeout = self.config.query_timeout();
            let tick = sample_tick(&self.parameters, query_timeout, session, cancel, &self.span);
            let Some(samples) = tick.await? else {
                debug!(parent: &self.span, "Tick {} dropped on cancel", ticks);
                return Ok(summary(ticks, absent_samples, StopReason::Cancelled));
            };

            let record = Record::new(timestamp, ticks, samples);
            let absent = record.absent_count() as u64;
            self.deliver(record)?;

            ticks += 1;
            absent_samples += absent;
            counter!("obd_sampler_ticks_total").increment(1);
            counter!("obd_sampler_absent_samples_total").increment(absent);

            let elapsed = started.elapsed();
            if elapsed > self.config.interval {
                counter!("obd_sampler_tick_overruns_total").increment(1);
                warn!(
                    parent: &self.span,
                    "Tick took {:?}, longer than the {:?} interval",
                    elapsed,
                    self.config.interval
                );
            }
        }
    }

    fn deliver(&mut self, record: Record) -> Result<(), SamplerError> {
        for sink in &mut self.sinks {
            sink.accept(&record).map_err(SamplerError::Persistence)?;
        }
        if let Some(observers) = &self.observers {
            // No receivers is fine
            let _ = observers.send(Arc::new(record));
        }
        Ok(())
    }

    /// Finish every sink, reporting the first failure
    fn finish_sinks(&mut self) -> Result<(), SamplerError> {
        let mut first_error = None;
        let span = &self.span;
        for sink in &mut self.sinks {
            if let Err(err) = sink.finish() {
                warn!(parent: span, "Finishing sink {} failed: {}", sink.name(), err);
                first_error.get_or_insert(SamplerError::Persistence(err));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Query every parameter once; `None` when cancelled mid-tick
///
/// A query in flight is abandoned as soon as cancellation is requested, so a
/// stop never waits out a query timeout longer than the interval.
async fn sample_tick(
    parameters: &[Parameter],
    query_timeout: Duration,
    session: &mut Session,
    cancel: &mut CancelToken,
    span: &Span,
) -> Result<Option<Vec<Sample>>, SamplerError> {
    let mut samples = Vec::with_capacity(parameters.len());

    for parameter in parameters {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            answer = time::timeout(query_timeout, session.query(parameter)) => answer,
        };
        let value = match answer {
            Ok(Ok(value)) => value,
            Ok(Err(err)) if err.is_fatal() => return Err(SamplerError::Connection(err)),
            Ok(Err(err)) => {
                warn!(parent: span, "{}", err);
                Value::Absent
            }
            Err(_) => {
                warn!(parent: span, "{} timed out after {:?}", parameter.name, query_timeout);
                Value::Absent
            }
        };
        samples.push(Sample::new(parameter, value));
    }
    Ok(Some(samples))
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn wall_clock(start: DateTime<Utc>, offset: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(offset)
        .ok()
        .and_then(|offset| start.checked_add_signed(offset))
        .unwrap_or(start)
}
