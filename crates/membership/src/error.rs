//! Error types for membership resolution

use thiserror::Error as ThisError;

/// Membership-related errors
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MembershipError {
    /// Configuration error, fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),
}
