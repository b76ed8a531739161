//! Hosted server.
//!
//! Two listeners share one [`AppState`]:
//!
//! - HTTP on the control port: `GET /` banner, `GET /health` → `OK`,
//!   anything else 404;
//! - WebSocket on the control port + 1: every connection is one session
//!   executing on this host.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmdlink::api::{serve, AppState};
//! use cmdlink::{Config, Dispatcher, SessionStore, SystemShell};
//!
//! #[tokio::main]
//! async fn main() -> cmdlink::Result<()> {
//!     let config = Config::default();
//!     let dispatcher = Dispatcher::new(Arc::new(SessionStore::new()), Arc::new(SystemShell::new()));
//!     let state = AppState::new(Arc::new(dispatcher), "example", std::env::current_dir()?);
//!     serve(&config, state).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod websocket;

pub use handlers::AppState;
pub use router::{health_router, serve, serve_listeners, ws_router};
pub use websocket::{WsReader, WsWriter};
