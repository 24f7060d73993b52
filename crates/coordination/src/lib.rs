//! Abstract interface to a replicated, session-oriented coordination service
//! holding a hierarchical namespace of nodes (ZooKeeper-like).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connect_string;
mod error;
pub mod path;
mod session;

pub use connect_string::ConnectString;
pub use error::{CoordinationError, CoordinationErrorKind, Error};
pub use session::{ConnectionState, SessionEvent, SessionWatcher};

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Metadata about a node in the coordination service's tree.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NodeStat {
    /// Number of direct children of the node.
    pub num_children: usize,
}

/// A session-oriented client to a coordination service.
///
/// Implementations deliver connection transitions asynchronously on the
/// [`SessionWatcher`] passed to [`connect`](Self::connect), independent of any
/// in-flight call. Node operations fail with an error whose
/// [`kind`](CoordinationError::kind) identifies the outcome.
#[async_trait]
pub trait CoordinationService
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for this service.
    type Error: CoordinationError;

    /// Opens a new session. Transitions are sent on `watcher` in the order
    /// they happen, starting with the first `SyncConnected`.
    async fn connect(
        &self,
        connect_string: &ConnectString,
        session_timeout: Duration,
        watcher: SessionWatcher,
    ) -> Result<(), Self::Error>;

    /// Closes the current session. Closing an already closed session is not an error.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Creates a persistent node at `path`. Fails with `NodeExists` if the
    /// node is already present and `NoNode` if its parent is missing.
    async fn create(&self, path: &str, data: Bytes) -> Result<(), Self::Error>;

    /// Reads the payload of the node at `path`.
    async fn get_data(&self, path: &str) -> Result<Bytes, Self::Error>;

    /// Lists the names of the direct children of `path`, in no particular order.
    async fn get_children(&self, path: &str) -> Result<Vec<String>, Self::Error>;

    /// Returns the stat of the node at `path`, or `None` if it does not exist.
    async fn exists(&self, path: &str) -> Result<Option<NodeStat>, Self::Error>;
}
