//! Session management module.
//!
//! Sessions are identified by [`SessionId`], carry their own working
//! directory, and live in a shared [`SessionStore`] for as long as their
//! control connection is open.

mod id;
mod state;
mod store;

pub use id::SessionId;
pub use state::SessionState;
pub use store::{Session, SessionConfig, SessionStore, SessionSummary, TransportKind};
