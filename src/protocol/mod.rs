//! Control-channel framing.
//!
//! Two disciplines carry the same [`CommandRequest`]/[`Response`] pair:
//!
//! - **stream**: length-prefixed [`Frame`]s over a raw TCP connection
//!   ([`FrameCodec`], [`StreamReader`], [`StreamWriter`]);
//! - **message**: one JSON object per WebSocket message (see
//!   `api::websocket` and `controller::link`).

pub mod channel;
pub mod codec;
pub mod message;

pub use channel::{CommandReader, ResponseWriter, StreamReader, StreamWriter};
pub use codec::{Frame, FrameCodec, MAX_FIELD_SIZE};
pub use message::{CommandRequest, Response, MAX_OUTPUT_LEN};
