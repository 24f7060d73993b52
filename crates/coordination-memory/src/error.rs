use qdb_coordination::{CoordinationError, CoordinationErrorKind};
use thiserror::Error;

/// Errors returned by the in-memory coordination service.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The node being created already exists.
    #[error("node [{0}] already exists")]
    NodeExists(String),

    /// The node, or the parent of a node being created, does not exist.
    #[error("no node [{0}]")]
    NoNode(String),

    /// The session is not connected.
    #[error("connection lost")]
    ConnectionLoss,

    /// The session has expired.
    #[error("session expired")]
    SessionExpired,

    /// A write was attempted on a read-only session.
    #[error("session is read-only")]
    NotReadOnly,

    /// The path is not a valid absolute node path.
    #[error("bad path [{0}]")]
    BadPath(String),

    /// A fault injected through one of the `fail_*` controls of
    /// [`MemoryCoordination`](crate::MemoryCoordination).
    #[error("injected {kind} fault on [{path}]")]
    Injected {
        /// The kind of the injected fault.
        kind: CoordinationErrorKind,
        /// The path of the failed operation.
        path: String,
    },
}

impl CoordinationError for Error {
    fn kind(&self) -> CoordinationErrorKind {
        match self {
            Self::NodeExists(_) => CoordinationErrorKind::NodeExists,
            Self::NoNode(_) => CoordinationErrorKind::NoNode,
            Self::ConnectionLoss => CoordinationErrorKind::ConnectionLoss,
            Self::SessionExpired => CoordinationErrorKind::SessionExpired,
            Self::NotReadOnly => CoordinationErrorKind::NotReadOnly,
            Self::BadPath(_) => CoordinationErrorKind::Other,
            Self::Injected { kind, .. } => *kind,
        }
    }
}
