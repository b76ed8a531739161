//! Command dispatch.
//!
//! Every command string a session receives is classified into an
//! [`Intent`] and handled by the [`Dispatcher`]. Only the `exec` intent
//! reaches the shell; everything else is answered in-process.

mod dispatcher;
mod intent;

pub use dispatcher::{
    render_sessions, DispatchSettings, Dispatcher, Reply, DEFAULT_CONNECT_TIMEOUT,
    DISCONNECT_MESSAGE,
};
pub use intent::Intent;
