//! Operator side of a control channel.
//!
//! A [`Repl`] drives any [`ControlLink`]: [`WsLink`] for hosted servers,
//! [`StreamLink`] for raw-stream agents.

mod link;
mod repl;

pub use link::{ControlLink, StreamLink, WsLink};
pub use repl::{Repl, ReplOutcome};
