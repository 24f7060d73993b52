//! Cluster metadata for QDB, kept in a replicated coordination service.
//!
//! The [`Repository`] is the domain-facing entry point. It owns a
//! [`MetadataStoreClient`] session, reruns the [`SchemaBootstrapper`] every
//! time the session (re)connects, and publishes a [`RepositoryStatus`] on
//! every connection transition.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod codec;
mod error;
mod model;
mod records;
mod repository;
mod schema;
mod status;

pub use client::{MetadataStoreClient, SessionHandler, SessionOptions, Transition};
pub use error::{BootstrapError, RepositoryError, StoreError};
pub use model::{Database, Entity, Node, Queue, User};
pub use repository::{Repository, RepositoryOptions};
pub use schema::{ADMIN_USER_ID, BootstrapOutcome, Namespace, SchemaBootstrapper, SchemaPaths};
pub use status::{RepositoryStatus, StatusPublisher, StatusSubscription};
