//! The four process runtimes behind the CLI subcommands.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::bootstrap::{connect_raw, connect_with_fallback, RawEndpoint, WsEndpoint};
use crate::cli::Mode;
use crate::config::{Config, DEFAULT_WS_PORT};
use crate::connection::run_session;
use crate::controller::{Repl, ReplOutcome, StreamLink, WsLink};
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::execution::SystemShell;
use crate::protocol::{StreamReader, StreamWriter};
use crate::session::{SessionConfig, SessionStore, TransportKind};
use crate::transfer::{PendingUpload, TransferListener};
use crate::Result;

/// Run the selected runtime to completion.
pub async fn run(mode: Mode, target: Option<&str>, config: &Config) -> Result<()> {
    let required = || {
        target.ok_or_else(|| Error::InvalidEndpoint(format!("'{}' requires a target", mode)))
    };
    match mode {
        Mode::Serve => serve(config).await,
        Mode::Connect => connect(required()?, config).await,
        Mode::Listen => listen(config).await,
        Mode::Agent => agent(required()?, config).await,
    }
}

/// Dispatcher executing on this host with the configured settings.
pub fn local_dispatcher(config: &Config) -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::new(Arc::new(SessionStore::new()), Arc::new(SystemShell::new()))
        .with_settings(config.dispatch_settings());
    Arc::new(dispatcher)
}

/// Hosted server: health HTTP plus WebSocket sessions.
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::new(
        local_dispatcher(config),
        config.host_name(),
        std::env::current_dir()?,
    )
    .with_ports(config.ws_port()?, config.server.transfer_port);
    api::serve(config, state).await
}

/// Operator client for a hosted server.
pub async fn connect(target: &str, config: &Config) -> Result<()> {
    let endpoint = WsEndpoint::parse(target, DEFAULT_WS_PORT)?;
    let pending = spawn_transfer_listener(config).await;

    let (stream, used) = connect_with_fallback(&endpoint).await?;
    info!(url = %used, "control channel open");

    let mut repl = operator_repl(pending);
    let outcome = repl.run(&mut WsLink::new(stream)).await?;
    info!(?outcome, "session finished");
    Ok(())
}

/// Raw-stream controller: serves agents one at a time.
pub async fn listen(config: &Config) -> Result<()> {
    let listener = TcpListener::bind(config.raw_bind_address()).await?;
    info!(addr = %listener.local_addr()?, "waiting for agents");
    let pending = spawn_transfer_listener(config).await;
    let mut repl = operator_repl(pending);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        info!(%peer, "agent connected");

        match repl.run(&mut StreamLink::new(stream)).await {
            Ok(ReplOutcome::InputClosed) => return Ok(()),
            Ok(outcome) => info!(%peer, ?outcome, "agent session finished"),
            Err(e) => warn!(%peer, "agent session failed: {}", e),
        }
    }
}

/// Raw-stream agent: executes the controller's commands on this host.
pub async fn agent(target: &str, config: &Config) -> Result<()> {
    let endpoint = RawEndpoint::parse(target, config.server.raw_port)?;
    let stream = connect_raw(&endpoint).await?;
    let peer = stream.peer_addr()?;
    let (read, write) = stream.into_split();

    let session = SessionConfig::new(std::env::current_dir()?, TransportKind::Stream)
        .peer(peer)
        .transfer_addr(Some(SocketAddr::new(peer.ip(), config.server.transfer_port)));
    let id = run_session(
        StreamReader::new(read),
        StreamWriter::new(write),
        local_dispatcher(config),
        session,
        &config.host_name(),
    )
    .await?;
    info!(session = %id, "controller released this agent");
    Ok(())
}

/// Start the subchannel listener; transfers are disabled if it cannot bind.
async fn spawn_transfer_listener(config: &Config) -> Option<PendingUpload> {
    let addr = config.transfer_bind_address();
    match TransferListener::bind(
        &addr,
        config.transfer.download_dir.clone(),
        config.transfer_options(),
    )
    .await
    {
        Ok(listener) => {
            let pending = listener.pending();
            tokio::spawn(listener.run());
            info!(%addr, "file transfer listener ready");
            Some(pending)
        }
        Err(e) => {
            warn!(%addr, "file transfers disabled: {}", e);
            None
        }
    }
}

fn operator_repl(
    pending: Option<PendingUpload>,
) -> Repl<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    let repl = Repl::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    match pending {
        Some(pending) => repl.with_pending(pending),
        None => repl,
    }
}
