use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad coordination service connect string.
    #[error(transparent)]
    Coordination(#[from] qdb_coordination::Error),

    /// The data directory is unusable.
    #[error("data directory [{path}] {reason}")]
    DataDirectory {
        /// The configured path.
        path: PathBuf,
        /// The unmet condition.
        reason: String,
    },

    /// Bad cluster membership configuration.
    #[error(transparent)]
    Membership(#[from] qdb_membership::MembershipError),

    /// Metadata repository error.
    #[error(transparent)]
    Repository(#[from] qdb_metadata::RepositoryError),

    /// Could not set global default subscriber.
    #[error("could not set global default subscriber: {0}")]
    SetTracing(#[from] tracing::dispatcher::SetGlobalDefaultError),
}
