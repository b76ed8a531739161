//! Router and listener setup of the hosted server.

use std::future::Future;
use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{health, index, not_found, AppState};
use super::websocket::ws_handler;
use crate::config::Config;
use crate::Result;

/// Router for the HTTP health listener.
pub fn health_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router for the WebSocket listener. Every path upgrades.
pub fn ws_router(state: AppState) -> Router {
    Router::new()
        .fallback(ws_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind both listeners from `config` and serve until Ctrl-C.
pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let http = TcpListener::bind(config.http_bind_address()).await?;
    let ws = TcpListener::bind(config.ws_bind_address()?).await?;
    serve_listeners(http, ws, state, shutdown_signal()).await
}

/// Serve on already-bound listeners until `shutdown` resolves.
pub async fn serve_listeners<F>(
    http: TcpListener,
    ws: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        http = %http.local_addr()?,
        websocket = %ws.local_addr()?,
        "cmdlink server listening"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let http_server = axum::serve(http, health_router(state.clone()))
        .with_graceful_shutdown(stopped(stop_rx.clone()));
    let ws_server = axum::serve(
        ws,
        ws_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(stopped(stop_rx));

    tokio::try_join!(async { http_server.await }, async { ws_server.await })?;
    info!("cmdlink server stopped");
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
