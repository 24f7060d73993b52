use qdb_coordination::{CoordinationError, CoordinationErrorKind};
use thiserror::Error;

/// Outcome of a failed primitive call on the metadata store, translated from
/// the coordination service's error taxonomy.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum StoreError {
    /// The node being created already exists.
    #[error("node [{0}] already exists")]
    AlreadyExists(String),

    /// The node does not exist.
    #[error("node [{0}] not found")]
    NotFound(String),

    /// The call failed for a reason that may go away once the session
    /// stabilizes (timeout, lost connection, expired session, read-only
    /// session, marshalling failure).
    #[error("metadata store call on [{path}] failed ({kind}): {reason}")]
    Transient {
        /// The path of the failed call.
        path: String,
        /// The coordination service error kind.
        kind: CoordinationErrorKind,
        /// Description of the failure.
        reason: String,
    },
}

impl StoreError {
    /// Translates a coordination service error raised by a call on `path`.
    pub fn from_coordination<E: CoordinationError>(path: &str, error: &E) -> Self {
        match error.kind() {
            CoordinationErrorKind::NodeExists => Self::AlreadyExists(path.to_string()),
            CoordinationErrorKind::NoNode => Self::NotFound(path.to_string()),
            kind => Self::Transient {
                path: path.to_string(),
                kind,
                reason: error.to_string(),
            },
        }
    }
}

/// Errors surfaced by the [`Repository`](crate::Repository).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RepositoryError {
    /// An entity with the same id already exists.
    #[error("{kind} [{id}] already exists")]
    DuplicateEntity {
        /// The kind of entity.
        kind: &'static str,
        /// The conflicting id.
        id: String,
    },

    /// The metadata store could not serve the call; it may be retried.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),

    /// A namespace node of the metadata schema is missing.
    #[error("metadata namespace [{0}] does not exist")]
    SchemaMissing(String),

    /// The id cannot be used as a path segment.
    #[error("invalid {kind} id [{id}]")]
    InvalidId {
        /// The kind of entity.
        kind: &'static str,
        /// The rejected id.
        id: String,
    },

    /// A stored record could not be encoded or decoded.
    #[error("cannot encode or decode {kind} record [{path}]: {reason}")]
    Codec {
        /// The kind of entity.
        kind: &'static str,
        /// The path of the record.
        path: String,
        /// Description of the failure.
        reason: String,
    },
}

impl From<StoreError> for RepositoryError {
    fn from(error: StoreError) -> Self {
        Self::StorageUnavailable(error)
    }
}

/// Errors from schema bootstrap.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BootstrapError {
    /// Creating a namespace node failed; the namespaces in `ensured` exist.
    #[error("schema bootstrap failed at [{path}] (ensured {ensured:?}): {source}")]
    PartialFailure {
        /// The namespace that could not be created.
        path: String,
        /// Namespaces confirmed to exist before the failure.
        ensured: Vec<String>,
        /// The underlying store error.
        source: StoreError,
    },

    /// Checking for or creating the admin user failed.
    #[error("failed to ensure admin user: {0}")]
    AdminUser(#[source] RepositoryError),
}
