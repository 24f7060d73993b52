//! Cluster membership for QDB servers.
//!
//! This crate provides:
//! - Server identity types (`ServerIdentity`)
//! - Resolution of the fixed server list from configuration
//! - A one-shot announcement of the resolved membership

pub mod error;
pub mod identity;
pub mod resolver;

pub use error::MembershipError;
pub use identity::ServerIdentity;
pub use resolver::{MembershipResolved, MembershipResolver};
