//! Transport-neutral halves of a control channel.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::FrameCodec;
use super::message::{CommandRequest, Response};
use crate::error::Error;
use crate::Result;

/// Receiving half: yields one command per call.
#[async_trait]
pub trait CommandReader: Send {
    /// Wait for the next command.
    ///
    /// Returns `Ok(None)` when the peer closed the connection. Recoverable
    /// errors (see [`Error::is_recoverable`]) leave the reader usable.
    /// Must be cancel-safe.
    async fn read_command(&mut self) -> Result<Option<String>>;
}

/// Sending half: writes whole responses.
#[async_trait]
pub trait ResponseWriter: Send {
    /// Deliver one response. An error means the connection is broken.
    async fn write_response(&mut self, response: &Response) -> Result<()>;

    /// Close the transport.
    async fn close(&mut self) -> Result<()>;
}

/// Command reader over a length-prefixed byte stream.
pub struct StreamReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin + Send> StreamReader<R> {
    pub fn new(io: R) -> Self {
        Self {
            inner: FramedRead::new(io, FrameCodec),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> CommandReader for StreamReader<R> {
    async fn read_command(&mut self) -> Result<Option<String>> {
        match self.inner.next().await {
            None => Ok(None),
            // The byte stream cannot resynchronise after a framing error.
            Some(Err(e)) => Err(Error::Connection(e.to_string())),
            Some(Ok(frame)) => Ok(Some(CommandRequest::from_frame(&frame)?.command)),
        }
    }
}

/// Response writer over a length-prefixed byte stream.
pub struct StreamWriter<W> {
    inner: FramedWrite<W, FrameCodec>,
}

impl<W: AsyncWrite + Unpin + Send> StreamWriter<W> {
    pub fn new(io: W) -> Self {
        Self {
            inner: FramedWrite::new(io, FrameCodec),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ResponseWriter for StreamWriter<W> {
    async fn write_response(&mut self, response: &Response) -> Result<()> {
        self.inner
            .send(response.to_frame())
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        SinkExt::close(&mut self.inner)
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}
