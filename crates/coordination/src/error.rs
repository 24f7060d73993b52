use std::error::Error as StdError;
use std::fmt::{self, Debug};

use thiserror::Error as ThisError;

/// Errors raised by the shared types of this crate.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum Error {
    /// The coordination service connect string could not be parsed.
    #[error("invalid coordination connect string [{input}]: {reason}")]
    InvalidConnectString {
        /// The offending input.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Marker trait for `CoordinationService` errors
pub trait CoordinationError: Debug + StdError + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> CoordinationErrorKind;
}

/// The kind of coordination service error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CoordinationErrorKind {
    /// The node being created already exists.
    NodeExists,

    /// The node (or the parent of a node being created) does not exist.
    NoNode,

    /// The connection was lost while the call was in flight.
    ConnectionLoss,

    /// The session has expired.
    SessionExpired,

    /// A write was attempted while connected read-only.
    NotReadOnly,

    /// The call did not complete in time.
    Timeout,

    /// A request or response could not be (de)serialized.
    Marshalling,

    /// Other/unknown error
    Other,
}

impl fmt::Display for CoordinationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
