//! OBD Session Logger - Main Entry Point
//!
//! Usage: `obd-logger [config.toml]`

use anyhow::Context;
use api::{init_logging, run_server, AppState, PipelineConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.logging)?;

    info!("=== OBD Session Logger v{} ===", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    if let Some(addr) = &config.server.metrics_bind {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics address {:?}", addr))?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    let state = AppState::from_config(&config)?;
    info!(
        "Logging to {} as {}",
        state.store.dir().display(),
        state.store.format().extension()
    );
    run_server(state, &config.server.bind)
        .await
        .with_context(|| format!("serving on {}", config.server.bind))?;

    Ok(())
}
