use std::net::SocketAddr;
use std::sync::Arc;

use onboard_poller::engine::{EngineConfig, PollingEngine};
use onboard_poller::sources::JsonGroups;
use onboard_poller::transport::TransportConfig;
use onboard_poller::web::{AppState, create_router};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Groups polled when `ONBOARD_GROUPS` is not set: the ICE Portal's status
/// and trip documents.
const DEFAULT_GROUPS: &str = "status=api1/rs/status,trip=api1/rs/tripInfo/trip";

const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let endpoint = std::env::var("ONBOARD_ENDPOINT")
        .map_err(|_| "ONBOARD_ENDPOINT must be set to the portal's base URL")?;
    let groups = std::env::var("ONBOARD_GROUPS").unwrap_or_else(|_| DEFAULT_GROUPS.to_string());
    let listen: SocketAddr = std::env::var("ONBOARD_LISTEN")
        .unwrap_or_else(|_| DEFAULT_LISTEN.to_string())
        .parse()?;
    let insecure = std::env::var("ONBOARD_INSECURE").is_ok_and(|v| v == "1" || v == "true");

    let source = JsonGroups::parse(&groups)?;
    if source.is_empty() {
        return Err("ONBOARD_GROUPS lists no groups".into());
    }
    if insecure {
        warn!("TLS certificate verification disabled");
    }

    let transport = TransportConfig::new(&endpoint).with_verify_tls(!insecure);
    let engine = Arc::new(PollingEngine::with_config(
        transport,
        EngineConfig::default(),
        source,
    )?);

    // start() blocks until the first refresh is in
    let starting = Arc::clone(&engine);
    if let Err(e) = tokio::task::spawn_blocking(move || starting.start()).await? {
        error!("{e}");
        std::process::exit(1);
    }

    let app = create_router(AppState::new(Arc::clone(&engine)));

    info!("Serving {endpoint} on http://{listen}");
    info!("  GET  /health       - Health check");
    info!("  GET  /status       - Engine state and counters");
    info!("  GET  /cache/{{key}}  - Last cached document");

    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tokio::task::spawn_blocking(move || engine.stop()).await?;
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
