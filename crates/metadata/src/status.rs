//! Readiness reporting for health endpoints.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use qdb_coordination::ConnectionState;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Default capacity of the status event channel.
pub(crate) const DEFAULT_CAPACITY: usize = 64;

/// Snapshot of the repository's fitness to serve traffic.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    /// Connection state of the metadata store session.
    pub state: ConnectionState,

    /// Connected, and schema bootstrap succeeded in the current session.
    pub ready: bool,

    /// When the repository last became ready.
    pub ready_since: Option<DateTime<Utc>>,

    /// Connected to a server that only serves reads.
    pub read_only: bool,

    /// Why the repository is connected but not ready, if it is.
    pub detail: Option<String>,
}

impl RepositoryStatus {
    /// Status for a state in which the repository cannot be ready.
    #[must_use]
    pub fn not_ready(state: ConnectionState) -> Self {
        Self {
            state,
            read_only: state == ConnectionState::ConnectedReadOnly,
            ..Self::default()
        }
    }

    /// Status after a successful bootstrap.
    #[must_use]
    pub fn ready_at(ready_since: DateTime<Utc>) -> Self {
        Self {
            state: ConnectionState::Connected,
            ready: true,
            ready_since: Some(ready_since),
            ..Self::default()
        }
    }

    /// Status after a failed bootstrap.
    #[must_use]
    pub fn bootstrap_failed(detail: String) -> Self {
        Self {
            state: ConnectionState::Connected,
            detail: Some(detail),
            ..Self::default()
        }
    }

    /// One-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        match (&self.ready_since, &self.detail) {
            (Some(since), _) if self.ready => format!("{} (up since {})", self.state, since),
            (_, Some(detail)) => format!("{}: {}", self.state, detail),
            _ => self.state.to_string(),
        }
    }
}

/// Publishes [`RepositoryStatus`] changes to subscribers and keeps the latest
/// snapshot for non-blocking reads.
#[derive(Clone, Debug)]
pub struct StatusPublisher {
    sender: broadcast::Sender<RepositoryStatus>,
    current: Arc<watch::Sender<RepositoryStatus>>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StatusPublisher {
    /// Create a publisher buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let (current, _) = watch::channel(RepositoryStatus::default());

        Self {
            sender,
            current: Arc::new(current),
        }
    }

    /// Replace the current snapshot and notify subscribers.
    pub fn publish(&self, status: RepositoryStatus) {
        debug!("Publishing repository status: {}", status.summary());
        self.current.send_replace(status.clone());

        // No subscribers is fine
        let _ = self.sender.send(status);
    }

    /// The latest published status.
    #[must_use]
    pub fn current(&self) -> RepositoryStatus {
        self.current.borrow().clone()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving end of a status subscription.
#[derive(Debug)]
pub struct StatusSubscription {
    receiver: broadcast::Receiver<RepositoryStatus>,
}

impl StatusSubscription {
    /// Receive the next status. A subscriber that fell behind skips to the
    /// oldest status still buffered. Returns `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<RepositoryStatus> {
        loop {
            match self.receiver.recv().await {
                Ok(status) => return Some(status),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Status subscriber lagged, skipped {} update(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
