//! Entities persisted in the metadata store.
//!
//! Every entity is stored at `{namespace}/{id}`. The id is carried by the
//! path; see the record codec for how it is left out of the stored body.

use std::fmt::{self, Debug};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::schema::Namespace;

/// An entity stored as one node under a schema namespace.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Human-readable kind, used in errors.
    const KIND: &'static str;

    /// The namespace holding records of this kind.
    const NAMESPACE: Namespace;

    /// The id of this entity.
    fn id(&self) -> &str;
}

/// A user account.
#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary key, immutable after creation.
    pub id: String,

    /// Hash of the user's password.
    pub password_hash: String,

    /// Whether the user has administrative rights.
    pub is_admin: bool,
}

impl User {
    /// Creates a user.
    pub fn new<I, P>(id: I, password_hash: P, is_admin: bool) -> Self
    where
        I: Into<String>,
        P: Into<String>,
    {
        Self {
            id: id.into(),
            password_hash: password_hash.into(),
            is_admin,
        }
    }

    /// A user known only by id, as returned by listings.
    pub fn with_id_only<I: Into<String>>(id: I) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

impl Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("password_hash", &"<redacted>")
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

impl Entity for User {
    const KIND: &'static str = "user";
    const NAMESPACE: Namespace = Namespace::Users;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A server registered with the cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node id.
    pub id: String,

    /// Address the server is reachable at.
    pub address: String,
}

impl Entity for Node {
    const KIND: &'static str = "node";
    const NAMESPACE: Namespace = Namespace::Nodes;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A database, the container of queues.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Database id.
    pub id: String,

    /// Id of the user owning the database.
    pub owner: String,
}

impl Database {
    /// Whether `user` may see this database.
    #[must_use]
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_admin || self.owner == user.id
    }
}

impl Entity for Database {
    const KIND: &'static str = "database";
    const NAMESPACE: Namespace = Namespace::Databases;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A queue within a database.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    /// Queue id.
    pub id: String,

    /// Id of the database the queue belongs to.
    pub database: String,

    /// Name of the queue, unique within its database.
    pub name: String,
}

impl Entity for Queue {
    const KIND: &'static str = "queue";
    const NAMESPACE: Namespace = Namespace::Queues;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_debug_redacts_hash() {
        let user = User::new("alice", "secret-hash", false);
        let debug = format!("{user:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret-hash"));
    }

    #[test]
    fn test_serialization_keeps_id() {
        let json = serde_json::to_value(User::new("alice", "h", true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": "alice", "passwordHash": "h", "isAdmin": true })
        );
    }

    #[test]
    fn test_database_visibility() {
        let db = Database {
            id: "orders".to_string(),
            owner: "alice".to_string(),
        };

        assert!(db.is_visible_to(&User::new("alice", "", false)));
        assert!(!db.is_visible_to(&User::new("bob", "", false)));
        assert!(db.is_visible_to(&User::new("admin", "", true)));
    }
}
