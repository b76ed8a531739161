//! Session storage and management.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{SessionId, SessionState};
use crate::error::Error;
use crate::Result;

/// Which control transport a session arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Length-prefixed frames over a raw TCP stream.
    Stream,
    /// JSON messages over WebSocket.
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stream => f.write_str("stream"),
            TransportKind::WebSocket => f.write_str("websocket"),
        }
    }
}

/// Parameters for registering a new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Starting working directory.
    pub cwd: PathBuf,
    /// Transport the session runs on.
    pub transport: TransportKind,
    /// Remote address of the control connection, if known.
    pub peer: Option<SocketAddr>,
    /// Where subchannel connections for this session go.
    pub transfer_addr: Option<SocketAddr>,
}

impl SessionConfig {
    pub fn new(cwd: impl Into<PathBuf>, transport: TransportKind) -> Self {
        Self {
            cwd: cwd.into(),
            transport,
            peer: None,
            transfer_addr: None,
        }
    }

    pub fn peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn transfer_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.transfer_addr = addr;
        self
    }
}

/// Server-side record of one connected control channel.
///
/// The transport handle itself stays with the task that serves the
/// connection; only metadata lives here.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
    pub cwd: PathBuf,
    pub transport: TransportKind,
    pub peer: Option<SocketAddr>,
    pub transfer_addr: Option<SocketAddr>,
}

impl Session {
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        Self {
            id,
            state: SessionState::Ready,
            cwd: config.cwd,
            transport: config.transport,
            peer: config.peer,
            transfer_addr: config.transfer_addr,
        }
    }
}

/// One row of the `list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub cwd: PathBuf,
}

/// Thread-safe storage for sessions, shared by every session task.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and return its freshly allocated ID.
    pub fn register(&self, config: SessionConfig) -> Result<SessionId> {
        let id = SessionId::next();
        let session = Session::new(id, config);

        let mut sessions = self.sessions.write().map_err(|_| Error::LockPoisoned)?;
        sessions.insert(id, session);
        Ok(id)
    }

    /// Get a clone of the session with the given ID.
    pub fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().map_err(|_| Error::LockPoisoned)?;
        Ok(sessions.get(id).cloned())
    }

    /// Current working directory of a session.
    pub fn cwd(&self, id: &SessionId) -> Result<PathBuf> {
        let sessions = self.sessions.read().map_err(|_| Error::LockPoisoned)?;
        sessions
            .get(id)
            .map(|s| s.cwd.clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }

    /// Update a session using a closure.
    ///
    /// Returns an error if the session doesn't exist.
    pub fn update<F, T>(&self, id: &SessionId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> T,
    {
        let mut sessions = self.sessions.write().map_err(|_| Error::LockPoisoned)?;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        Ok(f(session))
    }

    pub fn set_cwd(&self, id: &SessionId, cwd: &Path) -> Result<()> {
        self.update(id, |s| s.cwd = cwd.to_path_buf())
    }

    /// Move a session to a new state, enforcing the transition rules.
    pub fn transition(&self, id: &SessionId, target: SessionState) -> Result<()> {
        self.update(id, |s| s.state.transition_to(target))?
    }

    /// Remove a session from the store.
    pub fn remove(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut sessions = self.sessions.write().map_err(|_| Error::LockPoisoned)?;
        Ok(sessions.remove(id))
    }

    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Snapshot of every live session, ordered by ID.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().map_err(|_| Error::LockPoisoned)?;
        let mut rows: Vec<SessionSummary> = sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id,
                cwd: s.cwd.clone(),
            })
            .collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cwd: &str) -> SessionConfig {
        SessionConfig::new(cwd, TransportKind::Stream)
    }

    #[test]
    fn test_register_session() {
        let store = SessionStore::new();
        let id = store.register(config("/tmp")).unwrap();

        assert!(store.get(&id).unwrap().is_some());
        assert_eq!(store.count(), 1);
        assert_eq!(store.cwd(&id).unwrap(), PathBuf::from("/tmp"));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = SessionStore::new();
        let fake_id = SessionId::from_raw(u64::MAX);

        assert!(store.get(&fake_id).unwrap().is_none());
        assert!(store.cwd(&fake_id).is_err());
        assert!(store.set_cwd(&fake_id, Path::new("/")).is_err());
    }

    #[test]
    fn test_set_cwd() {
        let store = SessionStore::new();
        let id = store.register(config("/")).unwrap();

        store.set_cwd(&id, Path::new("/var")).unwrap();
        assert_eq!(store.get(&id).unwrap().unwrap().cwd, PathBuf::from("/var"));
    }

    #[test]
    fn test_transition_enforced() {
        let store = SessionStore::new();
        let id = store.register(config("/")).unwrap();

        store.transition(&id, SessionState::Transferring).unwrap();
        assert!(store.transition(&id, SessionState::Executing).is_err());
        store.transition(&id, SessionState::Ready).unwrap();
    }

    #[test]
    fn test_remove_session() {
        let store = SessionStore::new();
        let id = store.register(config("/")).unwrap();

        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.unwrap().id, id);
        assert!(store.get(&id).unwrap().is_none());
        assert!(store.remove(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_rows_sorted() {
        let store = SessionStore::new();
        let a = store.register(config("/a")).unwrap();
        let b = store.register(config("/b")).unwrap();

        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a);
        assert_eq!(rows[0].cwd, PathBuf::from("/a"));
        assert_eq!(rows[1].id, b);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.register(config("/")).unwrap())
            })
            .collect();

        let ids: std::collections::HashSet<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 50);
        assert_eq!(store.count(), 50);
    }
}
