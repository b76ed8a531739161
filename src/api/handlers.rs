//! HTTP handlers of the hosted server.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Html};

use crate::dispatch::Dispatcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Name announced in every welcome.
    pub host_name: Arc<str>,
    /// Starting cwd of every new session.
    pub start_dir: PathBuf,
    /// Port of the WebSocket listener, shown on the banner.
    pub ws_port: u16,
    /// Port controllers run their subchannel listener on.
    pub transfer_port: u16,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        host_name: impl Into<Arc<str>>,
        start_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dispatcher,
            host_name: host_name.into(),
            start_dir: start_dir.into(),
            ws_port: crate::config::DEFAULT_WS_PORT,
            transfer_port: crate::transfer::DEFAULT_TRANSFER_PORT,
        }
    }

    pub fn with_ports(mut self, ws_port: u16, transfer_port: u16) -> Self {
        self.ws_port = ws_port;
        self.transfer_port = transfer_port;
        self
    }
}

/// Landing page.
pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>cmdlink</title></head>\n<body>\n\
         <h1>cmdlink {}</h1>\n<p>{} is up. Sessions: {}. WebSocket port: {}.</p>\n\
         </body>\n</html>\n",
        env!("CARGO_PKG_VERSION"),
        state.host_name,
        state.dispatcher.store().count(),
        state.ws_port,
    ))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// Anything not routed.
pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
