//! Monitoring Routes

use aggregator::{SharedAggregator, Snapshot};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use metrics::counter;
use obd_sampler::{MonitorRequest, MonitorStatus, RunSummary, SamplerConfig};
use obd_session::RecordSink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::{ApiError, RunContext, SharedState};

/// Body of a start request; missing fields fall back to configured defaults
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub parameters: Option<Vec<String>>,
    pub interval_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    /// Persist records to a new log file
    #[serde(default = "default_log")]
    pub log: bool,
}

fn default_log() -> bool {
    true
}

/// Response for a started run
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: MonitorStatus,
    pub parameters: Vec<String>,
    pub log_path: Option<PathBuf>,
}

/// Response for a stop request
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

/// Monitor status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: MonitorStatus,
    pub parameters: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub log_path: Option<PathBuf>,
    pub last_summary: Option<RunSummary>,
}

/// Live aggregates of the current or last run
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub records_observed: u64,
    pub stats: Snapshot,
    pub last_text: BTreeMap<String, String>,
}

/// Start a monitoring run
pub async fn start(
    State(state): State<SharedState>,
    body: Option<Json<StartRequest>>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_else(|| StartRequest {
        log: true,
        ..StartRequest::default()
    });
    // Write lock serializes concurrent starts
    let mut state = state.write().await;
    state.ensure_adapter_free()?;

    let names = request
        .parameters
        .unwrap_or_else(|| state.defaults.parameters.clone());
    let parameters = state.catalog.select(&names)?;
    let interval_ms = request.interval_ms.unwrap_or(state.defaults.interval_ms);
    if interval_ms == 0 {
        return Err(ApiError::BadRequest(
            "interval_ms must be greater than zero".to_string(),
        ));
    }

    let mut config = SamplerConfig::new(Duration::from_millis(interval_ms));
    config.duration = request
        .duration_ms
        .or(state.defaults.duration_ms)
        .map(Duration::from_millis);
    config.query_timeout = state.defaults.query_timeout();

    let session = state.connect().await?;
    let aggregator = SharedAggregator::new();
    let mut sinks: Vec<Box<dyn RecordSink>> = vec![Box::new(aggregator.clone())];
    let mut log_path = None;
    if request.log {
        match state.store.create(&parameters) {
            Ok(writer) => {
                log_path = Some(writer.path().to_path_buf());
                sinks.push(Box::new(writer));
            }
            Err(err) => {
                let mut session = session;
                session.close().await;
                return Err(err.into());
            }
        }
    }

    let names: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();
    state
        .monitor
        .start(session, MonitorRequest { parameters, config }, sinks)
        .await?;
    counter!("api_monitor_runs_started_total").increment(1);
    info!("Monitoring {} parameters every {} ms", names.len(), interval_ms);

    state.run = RunContext {
        aggregator,
        parameters: names.clone(),
        log_path: log_path.clone(),
        started_at: Some(Utc::now()),
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(StartResponse {
            status: state.monitor.status(),
            parameters: names,
            log_path,
        }),
    ))
}

/// Stop the active run and wait for it to wind down
pub async fn stop(State(state): State<SharedState>) -> Json<StopResponse> {
    let state = state.read().await;
    let stopped = state.monitor.stop();
    let mut response = StopResponse {
        stopped,
        summary: None,
        error: None,
    };
    if stopped {
        match state.monitor.wait().await {
            Some(Ok(summary)) => response.summary = Some(summary),
            Some(Err(err)) => response.error = Some(err.to_string()),
            None => {}
        }
    }
    Json(response)
}

/// Current monitor status
pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let state = state.read().await;
    Json(StatusResponse {
        status: state.monitor.status(),
        parameters: state.run.parameters.clone(),
        started_at: state.run.started_at,
        log_path: state.run.log_path.clone(),
        last_summary: state.monitor.last_summary(),
    })
}

/// Aggregates so far
pub async fn snapshot(State(state): State<SharedState>) -> Json<SnapshotResponse> {
    let state = state.read().await;
    let aggregator = &state.run.aggregator;
    Json(SnapshotResponse {
        records_observed: aggregator.records_observed(),
        stats: aggregator.snapshot(),
        last_text: aggregator.last_text(),
    })
}
