//! # cmdlink
//!
//! Remote command channel with a file transfer side channel.
//!
//! An operator (the *controller*) types commands; an *executing side* runs
//! them on its host and answers with the output and its working directory.
//! Two control transports carry the same messages:
//!
//! - **WebSocket** (`serve` / `connect`): JSON messages, TLS with a one-time
//!   plain fallback on the client;
//! - **raw stream** (`listen` / `agent`): length-prefixed frames over TCP.
//!
//! `download` and `upload` move one file each over a separate TCP
//! *subchannel* that the executing side dials back to the controller.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmdlink::{Dispatcher, Reply, SessionConfig, SessionStore, SystemShell, TransportKind};
//!
//! #[tokio::main]
//! async fn main() -> cmdlink::Result<()> {
//!     cmdlink::logging::try_init().ok();
//!
//!     let store = Arc::new(SessionStore::new());
//!     let dispatcher = Dispatcher::new(Arc::clone(&store), Arc::new(SystemShell::new()));
//!     let id = store.register(SessionConfig::new("/tmp", TransportKind::Stream))?;
//!
//!     if let Reply::Respond(response) = dispatcher.dispatch(id, "ls").await {
//!         println!("{}", response.text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod bootstrap;
pub mod capability;
pub mod cli;
pub mod config;
pub mod connection;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod logging;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod transfer;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Dispatcher, Intent, Reply};
pub use error::{Error, Result};
pub use execution::{Command, ExecutionResult, ShellExecutor, SystemShell};
pub use protocol::{CommandRequest, Response};
pub use session::{SessionConfig, SessionId, SessionState, SessionStore, TransportKind};
