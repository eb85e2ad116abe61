pub mod config;
pub mod feedback;
pub mod inference;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod server;

use std::sync::Arc;

use anyhow::Context;

use config::GatewayConfig;
use inference::HttpBackend;
use jobs::JobStore;
use models::HttpModelSource;
use server::GatewayState;

/// Start the gateway and serve MCP on stdio until stdin closes.
///
/// 1. Initializes tracing from `LOG_*` variables (never on stdout).
/// 2. Loads the configuration snapshot; an invalid one is fatal.
/// 3. Installs the `SIGHUP` reload handler (Unix only).
/// 4. Serves requests; background jobs are abandoned on exit.
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing before anything logs
    logging::init(&logging::LogSettings::from_env());

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    let source = HttpModelSource::new().context("failed to build model listing client")?;
    let backend = HttpBackend::new().context("failed to build completion client")?;

    let state = Arc::new(GatewayState::new(
        config,
        Arc::new(source),
        Arc::new(backend),
        JobStore::new(),
    ));

    #[cfg(unix)]
    reload_on_hangup(Arc::clone(&state));

    server::serve_stdio(state)
        .await
        .context("stdio transport failed")?;
    Ok(())
}

/// Re-read the configuration whenever the process receives `SIGHUP`.
#[cfg(unix)]
fn reload_on_hangup(state: Arc<GatewayState>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGHUP, config reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            match state.reload() {
                Ok(()) => tracing::info!("configuration reloaded on SIGHUP"),
                Err(e) => tracing::warn!(
                    error = %e,
                    "config reload failed, keeping previous configuration"
                ),
            }
        }
    });
}
