//! In-memory (single process) implementation of the coordination service for
//! local development and tests.
//!
//! A [`MemoryEnsemble`] holds one shared tree of nodes. Each
//! [`MemoryCoordination`] obtained from it behaves like the session handle of
//! one server process: it has its own connection state, reports its own
//! session transitions, and can be driven through expiry, read-only and
//! disconnect scenarios.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use qdb_coordination::{
    ConnectString, ConnectionState, CoordinationErrorKind, CoordinationService, NodeStat,
    SessionEvent, SessionWatcher, path,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A shared in-memory tree of nodes, the "servers" of the coordination service.
#[derive(Clone, Debug, Default)]
pub struct MemoryEnsemble {
    tree: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl MemoryEnsemble {
    /// Creates an empty ensemble.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Creates a new, not yet connected, session handle onto this ensemble.
    #[must_use]
    pub fn client(&self) -> MemoryCoordination {
        MemoryCoordination {
            ensemble: self.clone(),
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    /// All node paths currently in the tree, sorted.
    pub async fn paths(&self) -> Vec<String> {
        self.tree.lock().await.keys().cloned().collect()
    }

    fn children_of<'a>(tree: &'a BTreeMap<String, Bytes>, parent: &str) -> Vec<&'a str> {
        let prefix = if parent == "/" {
            "/".to_string()
        } else {
            format!("{parent}/")
        };

        tree.range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| &key[prefix.len()..])
            .filter(|rest| !rest.contains('/'))
            .collect()
    }
}

#[derive(Debug, Default)]
struct Session {
    state: ConnectionState,
    watcher: Option<SessionWatcher>,
    next_faults: VecDeque<CoordinationErrorKind>,
    path_faults: HashMap<String, CoordinationErrorKind>,
    read_faults: HashMap<String, CoordinationErrorKind>,
    latency: Option<Duration>,
}

impl Session {
    fn notify(&mut self, event: SessionEvent) {
        if let Some(watcher) = &self.watcher {
            if watcher.send(event).is_err() {
                debug!("Session watcher dropped, discarding {:?}", event);
                self.watcher = None;
            }
        }
    }
}

/// One session handle onto a [`MemoryEnsemble`].
#[derive(Clone, Debug)]
pub struct MemoryCoordination {
    ensemble: MemoryEnsemble,
    session: Arc<Mutex<Session>>,
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        MemoryEnsemble::new().client()
    }
}

impl MemoryCoordination {
    /// Creates a session handle onto a fresh, private ensemble.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The ensemble this handle talks to.
    #[must_use]
    pub const fn ensemble(&self) -> &MemoryEnsemble {
        &self.ensemble
    }

    /// The current connection state of this handle.
    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state
    }

    /// Expires the session. In-flight and subsequent calls fail until
    /// [`reconnect`](Self::reconnect) establishes a new session.
    pub async fn expire_session(&self) {
        let mut session = self.session.lock().await;
        info!("Expiring in-memory coordination session");
        session.state = ConnectionState::Expired;
        session.notify(SessionEvent::Expired);
    }

    /// Drops the connection without expiring the session.
    pub async fn drop_connection(&self) {
        let mut session = self.session.lock().await;
        session.state = ConnectionState::Disconnected;
        session.notify(SessionEvent::Disconnected);
    }

    /// Degrades the session to read-only.
    pub async fn degrade(&self) {
        let mut session = self.session.lock().await;
        session.state = ConnectionState::ConnectedReadOnly;
        session.notify(SessionEvent::ConnectedReadOnly);
    }

    /// Re-establishes a read-write connection. After expiry this is a fresh
    /// session and is reported as `Disconnected` followed by `SyncConnected`.
    pub async fn reconnect(&self) {
        let mut session = self.session.lock().await;
        if session.state == ConnectionState::Expired {
            session.notify(SessionEvent::Disconnected);
        }
        session.state = ConnectionState::Connected;
        session.notify(SessionEvent::SyncConnected);
    }

    /// Makes the next node operation fail with `kind`. Queued faults are
    /// consumed in order.
    pub async fn fail_next(&self, kind: CoordinationErrorKind) {
        self.session.lock().await.next_faults.push_back(kind);
    }

    /// Makes every operation on exactly `path` fail with `kind` until
    /// [`clear_faults`](Self::clear_faults) is called.
    pub async fn fail_path<P: Into<String> + Send>(&self, path: P, kind: CoordinationErrorKind) {
        self.session
            .lock()
            .await
            .path_faults
            .insert(path.into(), kind);
    }

    /// Makes every read of exactly `path` fail with `kind`, leaving writes
    /// alone, until [`clear_faults`](Self::clear_faults) is called.
    pub async fn fail_reads<P: Into<String> + Send>(&self, path: P, kind: CoordinationErrorKind) {
        self.session
            .lock()
            .await
            .read_faults
            .insert(path.into(), kind);
    }

    /// Removes all injected faults.
    pub async fn clear_faults(&self) {
        let mut session = self.session.lock().await;
        session.next_faults.clear();
        session.path_faults.clear();
        session.read_faults.clear();
    }

    /// Delays every node operation by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.session.lock().await.latency = latency;
    }

    async fn admit(&self, path: &str, write: bool) -> Result<(), Error> {
        let latency = {
            let mut session = self.session.lock().await;

            match session.state {
                ConnectionState::Disconnected => return Err(Error::ConnectionLoss),
                ConnectionState::Expired => return Err(Error::SessionExpired),
                ConnectionState::ConnectedReadOnly if write => return Err(Error::NotReadOnly),
                ConnectionState::Connected | ConnectionState::ConnectedReadOnly => {}
            }

            if let Some(kind) = session.next_faults.pop_front() {
                return Err(Error::Injected {
                    kind,
                    path: path.to_string(),
                });
            }
            let path_fault = session.path_faults.get(path);
            let read_fault = (!write).then(|| session.read_faults.get(path)).flatten();
            if let Some(kind) = path_fault.or(read_fault) {
                return Err(Error::Injected {
                    kind: *kind,
                    path: path.to_string(),
                });
            }

            session.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if !path::is_valid_path(path) {
            return Err(Error::BadPath(path.to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl CoordinationService for MemoryCoordination {
    type Error = Error;

    async fn connect(
        &self,
        connect_string: &ConnectString,
        session_timeout: Duration,
        watcher: SessionWatcher,
    ) -> Result<(), Self::Error> {
        info!(
            hosts = connect_string.hosts().len(),
            chroot = connect_string.chroot().unwrap_or("/"),
            "Opening in-memory coordination session (ensemble {}, session timeout {:?})",
            connect_string,
            session_timeout
        );

        let mut session = self.session.lock().await;
        session.watcher = Some(watcher);
        session.state = ConnectionState::Connected;
        session.notify(SessionEvent::SyncConnected);

        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut session = self.session.lock().await;
        if session.watcher.is_some() || session.state != ConnectionState::Disconnected {
            session.state = ConnectionState::Disconnected;
            session.notify(SessionEvent::Closed);
            session.watcher = None;
        }

        Ok(())
    }

    async fn create(&self, path: &str, data: Bytes) -> Result<(), Self::Error> {
        self.admit(path, true).await?;

        let mut tree = self.ensemble.tree.lock().await;
        if path == "/" || tree.contains_key(path) {
            return Err(Error::NodeExists(path.to_string()));
        }
        if let Some(parent) = path::parent(path) {
            if parent != "/" && !tree.contains_key(parent) {
                return Err(Error::NoNode(parent.to_string()));
            }
        }

        tree.insert(path.to_string(), data);
        debug!("Created node {}", path);

        Ok(())
    }

    async fn get_data(&self, path: &str) -> Result<Bytes, Self::Error> {
        self.admit(path, false).await?;

        let tree = self.ensemble.tree.lock().await;
        tree.get(path)
            .cloned()
            .ok_or_else(|| Error::NoNode(path.to_string()))
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>, Self::Error> {
        self.admit(path, false).await?;

        let tree = self.ensemble.tree.lock().await;
        if path != "/" && !tree.contains_key(path) {
            return Err(Error::NoNode(path.to_string()));
        }

        Ok(MemoryEnsemble::children_of(&tree, path)
            .into_iter()
            .map(ToString::to_string)
            .collect())
    }

    async fn exists(&self, path: &str) -> Result<Option<NodeStat>, Self::Error> {
        self.admit(path, false).await?;

        let tree = self.ensemble.tree.lock().await;
        if path != "/" && !tree.contains_key(path) {
            return Ok(None);
        }

        Ok(Some(NodeStat {
            num_children: MemoryEnsemble::children_of(&tree, path).len(),
        }))
    }
}
