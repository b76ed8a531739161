//! The per-connection session loop.
//!
//! One call to [`run_session`] owns one control transport from the welcome
//! to the close. The shared [`Dispatcher`] does the actual work.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, Reply};
use crate::error::Error;
use crate::protocol::{CommandReader, Response, ResponseWriter};
use crate::session::{SessionConfig, SessionId, SessionState};
use crate::Result;

/// Serve one control connection until the peer leaves or asks to.
///
/// The session is registered before the welcome goes out and is removed
/// from the store on every exit path. While a command is being dispatched
/// the reader keeps being polled: later commands are queued in order and a
/// closed transport ends the session at once, dropping the in-flight work.
pub async fn run_session<R, W>(
    mut reader: R,
    mut writer: W,
    dispatcher: Arc<Dispatcher>,
    config: SessionConfig,
    host: &str,
) -> Result<SessionId>
where
    R: CommandReader,
    W: ResponseWriter,
{
    let store = Arc::clone(dispatcher.store());
    let transport = config.transport;
    let peer = config.peer;
    let id = store.register(config)?;
    info!(
        session = %id,
        %transport,
        peer = ?peer,
        sessions = store.count(),
        "session opened"
    );

    let outcome = serve(&mut reader, &mut writer, &dispatcher, id, host).await;

    if let Err(e) = store.transition(&id, SessionState::Closed) {
        debug!(session = %id, "close transition skipped: {}", e);
    }
    store.remove(&id)?;
    if let Err(e) = writer.close().await {
        debug!(session = %id, "transport close failed: {}", e);
    }

    match &outcome {
        Ok(()) => info!(session = %id, sessions = store.count(), "session closed"),
        Err(e) => warn!(session = %id, sessions = store.count(), "session ended: {}", e),
    }
    outcome.map(|()| id)
}

async fn serve<R, W>(
    reader: &mut R,
    writer: &mut W,
    dispatcher: &Dispatcher,
    id: SessionId,
    host: &str,
) -> Result<()>
where
    R: CommandReader,
    W: ResponseWriter,
{
    let store = dispatcher.store();
    writer
        .write_response(&Response::welcome(host, &store.cwd(&id)?))
        .await?;

    let mut queued: VecDeque<Result<String>> = VecDeque::new();
    loop {
        let next = match queued.pop_front() {
            Some(next) => next,
            None => match reader.read_command().await {
                Ok(Some(command)) => Ok(command),
                Ok(None) => {
                    debug!(session = %id, "peer closed the connection");
                    return Ok(());
                }
                Err(e) => Err(e),
            },
        };

        let command = match next {
            Ok(command) => command,
            Err(e) if e.is_recoverable() => {
                warn!(session = %id, "undecodable message: {}", e);
                let response = Response::error(format!("Invalid message: {}", e), &store.cwd(&id)?);
                writer.write_response(&response).await?;
                continue;
            }
            Err(e) => return Err(e),
        };

        let reply = {
            let dispatch = dispatcher.dispatch(id, &command);
            tokio::pin!(dispatch);
            loop {
                tokio::select! {
                    reply = &mut dispatch => break reply,
                    incoming = reader.read_command() => match incoming {
                        Ok(Some(command)) => queued.push_back(Ok(command)),
                        Ok(None) => {
                            info!(session = %id, "connection lost while a command was running");
                            return Ok(());
                        }
                        Err(e) if e.is_recoverable() => queued.push_back(Err(e)),
                        Err(e) => return Err(e),
                    },
                }
            }
        };

        match reply {
            Reply::Silent => {}
            Reply::Respond(response) => writer.write_response(&response).await?,
            Reply::Close(response) => {
                writer.write_response(&response).await?;
                return Ok(());
            }
        }
    }
}

/// Whether an error ended the session because the transport went away
/// rather than because something inside the session failed.
pub fn is_disconnect(error: &Error) -> bool {
    match error {
        Error::Connection(_) | Error::WebSocket(_) => true,
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Command, ExecutionResult, ShellExecutor};
    use crate::session::{SessionStore, TransportKind};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Reader fed from a channel; a closed channel is a closed transport.
    struct ChannelReader(mpsc::UnboundedReceiver<Result<String>>);

    #[async_trait]
    impl CommandReader for ChannelReader {
        async fn read_command(&mut self) -> Result<Option<String>> {
            match self.0.recv().await {
                Some(Ok(command)) => Ok(Some(command)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    struct ChannelWriter(mpsc::UnboundedSender<Response>);

    #[async_trait]
    impl ResponseWriter for ChannelWriter {
        async fn write_response(&mut self, response: &Response) -> Result<()> {
            self.0
                .send(response.clone())
                .map_err(|e| Error::Connection(e.to_string()))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Echoes the command line back after a short pause.
    struct Echo(Duration);

    #[async_trait]
    impl ShellExecutor for Echo {
        async fn execute(&self, command: &Command) -> Result<ExecutionResult> {
            tokio::time::sleep(self.0).await;
            Ok(ExecutionResult::new(command.command_line.clone(), ""))
        }
    }

    fn harness(
        delay: Duration,
    ) -> (
        Arc<Dispatcher>,
        mpsc::UnboundedSender<Result<String>>,
        ChannelReader,
        ChannelWriter,
        mpsc::UnboundedReceiver<Response>,
    ) {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(SessionStore::new()),
            Arc::new(Echo(delay)),
        ));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        (
            dispatcher,
            cmd_tx,
            ChannelReader(cmd_rx),
            ChannelWriter(resp_tx),
            resp_rx,
        )
    }

    #[tokio::test]
    async fn test_welcome_then_responses_in_order() {
        let (dispatcher, tx, reader, writer, mut rx) = harness(Duration::from_millis(20));
        tx.send(Ok("first".into())).unwrap();
        tx.send(Ok("second".into())).unwrap();
        tx.send(Ok("".into())).unwrap();
        tx.send(Ok("exit".into())).unwrap();

        let config = SessionConfig::new("/", TransportKind::Stream);
        run_session(reader, writer, dispatcher.clone(), config, "test-host")
            .await
            .unwrap();

        let welcome = rx.recv().await.unwrap();
        assert_eq!(welcome.tag(), "welcome");
        assert_eq!(welcome.text(), "Connected to test-host. CWD: /");
        assert_eq!(rx.recv().await.unwrap().text(), "first");
        assert_eq!(rx.recv().await.unwrap().text(), "second");
        assert_eq!(rx.recv().await.unwrap().text(), "Disconnecting...");
        assert!(rx.recv().await.is_none());
        assert_eq!(dispatcher.store().count(), 0);
    }

    #[tokio::test]
    async fn test_recoverable_error_keeps_session() {
        let (dispatcher, tx, reader, writer, mut rx) = harness(Duration::ZERO);
        tx.send(Err(Error::Protocol("garbage".into()))).unwrap();
        tx.send(Ok("still here".into())).unwrap();

        let config = SessionConfig::new("/", TransportKind::WebSocket);
        let task = tokio::spawn(run_session(reader, writer, dispatcher, config, "h"));

        assert_eq!(rx.recv().await.unwrap().tag(), "welcome");
        let err = rx.recv().await.unwrap();
        assert_eq!(err.tag(), "error");
        assert!(err.text().starts_with("Invalid message"));
        assert_eq!(rx.recv().await.unwrap().text(), "still here");

        tx.send(Ok("exit".into())).unwrap();
        assert_eq!(rx.recv().await.unwrap().text(), "Disconnecting...");
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_during_exec_removes_session() {
        let (dispatcher, tx, reader, writer, mut rx) = harness(Duration::from_secs(30));
        let store = Arc::clone(dispatcher.store());
        let task = tokio::spawn(run_session(
            reader,
            writer,
            dispatcher,
            SessionConfig::new("/", TransportKind::Stream),
            "h",
        ));

        assert_eq!(rx.recv().await.unwrap().tag(), "welcome");
        assert_eq!(store.count(), 1);
        tx.send(Ok("sleep 30".into())).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(store.count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fatal_read_error_ends_session() {
        let (dispatcher, tx, reader, writer, _rx) = harness(Duration::ZERO);
        tx.send(Err(Error::Connection("reset".into()))).unwrap();

        let config = SessionConfig::new(Path::new("/"), TransportKind::Stream);
        let err = run_session(reader, writer, dispatcher.clone(), config, "h")
            .await
            .unwrap_err();
        assert!(is_disconnect(&err));
        assert_eq!(dispatcher.store().count(), 0);
    }
}
