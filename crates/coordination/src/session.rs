use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sending half of the channel on which a coordination service reports
/// session transitions.
pub type SessionWatcher = mpsc::UnboundedSender<SessionEvent>;

/// A session transition reported by the coordination service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    /// The session is connected and can serve reads and writes.
    SyncConnected,

    /// The session is connected to a server that can only serve reads.
    ConnectedReadOnly,

    /// The connection was lost; the session may still be recovered.
    Disconnected,

    /// The session expired. Every guarantee tied to it is void.
    Expired,

    /// The session was closed by the client.
    Closed,
}

/// Connection state of the metadata store session.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session is connected.
    #[default]
    Disconnected,

    /// Connected with read and write access.
    Connected,

    /// Connected with read access only.
    ConnectedReadOnly,

    /// The session expired and a new one must be established.
    Expired,
}

impl ConnectionState {
    /// Returns the state reached by applying `event`, or `None` if the event
    /// leaves the state unchanged.
    #[must_use]
    pub fn transition(self, event: SessionEvent) -> Option<Self> {
        let next = match event {
            SessionEvent::SyncConnected => Self::Connected,
            SessionEvent::ConnectedReadOnly => Self::ConnectedReadOnly,
            SessionEvent::Disconnected | SessionEvent::Closed => Self::Disconnected,
            SessionEvent::Expired => Self::Expired,
        };

        (next != self).then_some(next)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connected => "CONNECTED",
            Self::ConnectedReadOnly => "CONNECTEDREADONLY",
            Self::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}
