//! OBD Session Logger API Server
//!
//! HTTP control surface over the sampling pipeline: start and stop
//! monitoring runs, read live aggregates, read and clear trouble codes,
//! analyze stored logs, and assemble diagnostic reports.

use aggregator::SharedAggregator;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use obd_protocol::{Adapter, SimulatedAdapter};
use obd_sampler::{Monitor, MonitorStatus};
use obd_session::{Parameter, ParameterCatalog, Session};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use storage::LogStore;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Span};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
mod routes;

pub use config::PipelineConfig;
pub use error::{ApiError, SettingsError};

use config::{LoggingConfig, MonitorDefaults};

/// Builds a fresh, unconnected adapter for each session
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn Adapter> + Send + Sync>;

/// State of the current (or last) monitoring run
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub aggregator: SharedAggregator,
    pub parameters: Vec<String>,
    pub log_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Application state shared across handlers
pub struct AppState {
    pub catalog: ParameterCatalog,
    pub defaults: MonitorDefaults,
    pub monitor: Monitor,
    pub store: LogStore,
    pub adapters: AdapterFactory,
    pub run: RunContext,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Held for the life of every one-shot session
    adapter_claim: Mutex<()>,
    span: Span,
}

impl AppState {
    /// Create new application state
    pub fn new(
        catalog: ParameterCatalog,
        defaults: MonitorDefaults,
        store: LogStore,
        adapters: AdapterFactory,
    ) -> Self {
        let span = info_span!("obd_logger");
        Self {
            catalog,
            defaults,
            monitor: Monitor::new_in(&span),
            store,
            adapters,
            run: RunContext::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            adapter_claim: Mutex::new(()),
            span,
        }
    }

    /// Build state from configuration, with the simulated adapter
    pub fn from_config(config: &PipelineConfig) -> Result<Self, SettingsError> {
        let catalog = config.catalog()?;
        let simulator = config.adapter.simulator()?;
        let store = LogStore::new(&config.storage.directory, config.storage.format)
            .map_err(|e| SettingsError::Invalid(e.to_string()))?
            .with_durability(config.storage.durability);
        let adapters: AdapterFactory =
            Arc::new(move || Box::new(SimulatedAdapter::new(simulator.clone())) as Box<dyn Adapter>);
        Ok(Self::new(catalog, config.monitor.clone(), store, adapters))
    }

    /// Claim the adapter for a one-shot session
    ///
    /// Hold the guard until the session is closed. One-shot sessions run one
    /// at a time, and never while a monitoring run owns the adapter.
    pub(crate) async fn claim_adapter(&self) -> Result<MutexGuard<'_, ()>, ApiError> {
        let claim = self.adapter_claim.lock().await;
        self.ensure_adapter_free()?;
        Ok(claim)
    }

    /// Open a new adapter session
    pub(crate) async fn connect(&self) -> Result<Session, ApiError> {
        Ok(Session::connect_in((self.adapters)(), &self.span).await?)
    }

    /// Reject work that needs the adapter while a run owns it
    pub(crate) fn ensure_adapter_free(&self) -> Result<(), ApiError> {
        if self.monitor.is_running() {
            return Err(ApiError::Conflict(
                "Adapter is in use by an active monitoring run".to_string(),
            ));
        }
        Ok(())
    }
}

pub type SharedState = Arc<RwLock<AppState>>;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitor: MonitorStatus,
    pub log_directory: PathBuf,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/parameters", get(parameters_handler))
        .route("/api/v1/monitor/start", post(routes::monitor::start))
        .route("/api/v1/monitor/stop", post(routes::monitor::stop))
        .route("/api/v1/monitor/status", get(routes::monitor::status))
        .route("/api/v1/monitor/snapshot", get(routes::monitor::snapshot))
        .route(
            "/api/v1/faults",
            get(routes::faults::read).delete(routes::faults::clear),
        )
        .route("/api/v1/logs", get(routes::logs::list))
        .route("/api/v1/logs/analyze", post(routes::logs::analyze))
        .route("/api/v1/report", get(routes::report::generate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        monitor: state.monitor.status(),
        log_directory: state.store.dir().to_path_buf(),
    })
}

/// Catalog listing
async fn parameters_handler(State(state): State<SharedState>) -> Json<Vec<Parameter>> {
    Json(state.read().await.catalog.parameters().to_vec())
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), SettingsError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| SettingsError::Logging(e.to_string()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| SettingsError::Logging(e.to_string()))
}

/// Serve until Ctrl-C, then stop any active run so its log is closed
pub async fn run_server(state: AppState, addr: &str) -> std::io::Result<()> {
    let state = Arc::new(RwLock::new(state));
    let app = create_router(state.clone());

    info!("Starting API server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let state = state.read().await;
    if state.monitor.stop() {
        info!("Waiting for the active run to finish");
        if let Some(Err(err)) = state.monitor.wait().await {
            tracing::warn!("Run ended with error: {}", err);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl-C handler unavailable: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
