//! mnt-daemon entry point.
//!
//! Thin: sets up tracing, wires chain + registry + driver, starts the nonce
//! resync task and the HTTP server. Handlers live in `routes.rs`; shared
//! state in `state.rs`.
//!
//! Usage: `mnt-daemon [config.yaml ...]` (layered in argument order).

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mnt_daemon::{routes, state};
use mnt_runtime::RuntimeConfig;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let paths: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let rt = RuntimeConfig::load(&paths)?;
    info!(config_hash = %rt.config_hash, "config loaded");

    // Startup failures (node, signer, DB) are fatal.
    let chain = mnt_runtime::connect_chain(&rt).await?;
    let registry = mnt_runtime::connect_registry(&rt).await?;
    let resync = chain.nonces.spawn_resync(rt.resync_policy());

    let driver = Arc::new(mnt_runtime::build_driver(&chain, registry));
    let shared = Arc::new(state::AppState::new(
        driver,
        Some(chain.contract()),
        rt.settings.reconcile.batch_size,
    ));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    if let Some(interval) = rt.settings.reconcile.interval() {
        info!(interval_secs = interval.as_secs(), "periodic reconciliation enabled");
        state::spawn_reconcile_tick(Arc::clone(&shared), interval);
    }

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("mnt-daemon listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    resync.shutdown();
    info!("mnt-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("MNT_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available: run until killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
