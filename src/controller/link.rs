//! Controller ends of the two control transports.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::codec::Framed;

use crate::error::Error;
use crate::protocol::{CommandRequest, FrameCodec, Response};
use crate::Result;

/// Sends commands and receives responses on behalf of an operator.
#[async_trait]
pub trait ControlLink: Send {
    async fn send_command(&mut self, command: &str) -> Result<()>;

    /// Next response, or `None` once the executing side has closed.
    async fn recv_response(&mut self) -> Result<Option<Response>>;
}

/// Link over a client WebSocket, JSON encoded.
pub struct WsLink<S> {
    inner: WebSocketStream<S>,
}

impl<S> WsLink<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> ControlLink for WsLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_command(&mut self, command: &str) -> Result<()> {
        let json = serde_json::to_string(&CommandRequest::new(command))?;
        self.inner.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn recv_response(&mut self) -> Result<Option<Response>> {
        while let Some(message) = self.inner.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }
}

/// Link over a raw byte stream with length-prefixed frames.
pub struct StreamLink<T> {
    inner: Framed<T, FrameCodec>,
}

impl<T: AsyncRead + AsyncWrite> StreamLink<T> {
    pub fn new(io: T) -> Self {
        Self {
            inner: Framed::new(io, FrameCodec),
        }
    }
}

#[async_trait]
impl<T> ControlLink for StreamLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_command(&mut self, command: &str) -> Result<()> {
        self.inner
            .send(CommandRequest::new(command).to_frame())
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn recv_response(&mut self) -> Result<Option<Response>> {
        match self.inner.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(Error::Connection(e.to_string())),
            Some(Ok(frame)) => Ok(Some(Response::from_frame(&frame)?)),
        }
    }
}
