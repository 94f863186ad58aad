mod config;
mod sweep;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use muster_api::access::policy_from_name;
use muster_api::{AppState, AppStateInner};
use muster_db::Database;
use muster_presence::TypingRegistry;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muster=debug,muster_api=debug,muster_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let access = policy_from_name(&config.access)
        .ok_or_else(|| anyhow!("MUSTER_ACCESS must be 'open' or 'roster', got '{}'", config.access))?;

    let db = Database::open(&config.db_path)?;
    let typing = TypingRegistry::new();

    tokio::spawn(sweep::run_sweep_loop(
        typing.clone(),
        config.typing_sweep_interval,
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        typing,
        access,
        jwt_secret: config.jwt_secret.clone(),
        typing_ttl: config.typing_ttl,
    });

    let app = muster_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Muster chat server listening on {}", addr);
    info!(
        "Access policy: {}, typing TTL: {}s",
        config.access,
        config.typing_ttl.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
