//! WebSocket sessions: one connection, one session.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tracing::debug;

use super::handlers::AppState;
use crate::connection::{is_disconnect, run_session};
use crate::error::Error;
use crate::protocol::{CommandReader, CommandRequest, Response, ResponseWriter};
use crate::session::{SessionConfig, TransportKind};
use crate::Result;

/// WebSocket upgrade handler. Accepted on any path.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (sink, stream) = socket.split();
    let config = SessionConfig::new(state.start_dir.clone(), TransportKind::WebSocket)
        .peer(peer)
        .transfer_addr(Some(SocketAddr::new(peer.ip(), state.transfer_port)));

    let result = run_session(
        WsReader::new(stream),
        WsWriter::new(sink),
        state.dispatcher.clone(),
        config,
        &state.host_name,
    )
    .await;

    if let Err(e) = result {
        if is_disconnect(&e) {
            debug!(%peer, "websocket dropped: {}", e);
        }
    }
}

/// Receiving half of a server-side WebSocket.
pub struct WsReader {
    inner: SplitStream<WebSocket>,
}

impl WsReader {
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CommandReader for WsReader {
    async fn read_command(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.inner.next().await {
            match message.map_err(|e| Error::Connection(e.to_string()))? {
                Message::Text(text) => {
                    let request: CommandRequest = serde_json::from_str(text.as_str())?;
                    return Ok(Some(request.command));
                }
                Message::Binary(_) => {
                    return Err(Error::Protocol("binary messages are not accepted".into()))
                }
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) => continue,
            }
        }
        Ok(None)
    }
}

/// Sending half of a server-side WebSocket.
pub struct WsWriter {
    inner: SplitSink<WebSocket, Message>,
}

impl WsWriter {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ResponseWriter for WsWriter {
    async fn write_response(&mut self, response: &Response) -> Result<()> {
        let json = serde_json::to_string(response)?;
        self.inner
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.inner
            .close()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}
