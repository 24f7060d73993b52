//! Layout of the metadata namespace and its idempotent bootstrap.

use bytes::Bytes;
use qdb_coordination::{CoordinationService, path};
use tracing::{debug, info};

use crate::records::Records;
use crate::{BootstrapError, MetadataStoreClient, RepositoryError, StoreError, User};

/// Path of the top-level root shared by every cluster.
pub const ROOT: &str = "/qdb";

/// Id of the administrative account seeded by bootstrap.
pub const ADMIN_USER_ID: &str = "admin";

/// The child namespaces of a cluster root.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Namespace {
    /// Registered server nodes.
    Nodes,

    /// Databases.
    Databases,

    /// Queues.
    Queues,

    /// User accounts.
    Users,
}

impl Namespace {
    /// Every namespace, in bootstrap order.
    pub const ALL: [Self; 4] = [Self::Nodes, Self::Databases, Self::Queues, Self::Users];

    /// The path segment of this namespace.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Databases => "databases",
            Self::Queues => "queues",
            Self::Users => "users",
        }
    }
}

/// Paths of the metadata schema for one cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaPaths {
    cluster_root: String,
}

impl SchemaPaths {
    /// Paths for the cluster named `cluster_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidId`] if the name cannot be used as a
    /// path segment.
    pub fn new(cluster_name: &str) -> Result<Self, RepositoryError> {
        if !path::is_valid_segment(cluster_name) {
            return Err(RepositoryError::InvalidId {
                kind: "cluster",
                id: cluster_name.to_string(),
            });
        }

        Ok(Self {
            cluster_root: path::join(ROOT, cluster_name),
        })
    }

    /// `/qdb/{clusterName}`
    #[must_use]
    pub fn cluster_root(&self) -> &str {
        &self.cluster_root
    }

    /// `/qdb/{clusterName}/{namespace}`
    #[must_use]
    pub fn namespace(&self, namespace: Namespace) -> String {
        path::join(&self.cluster_root, namespace.as_str())
    }

    /// `/qdb/{clusterName}/{namespace}/{id}`
    #[must_use]
    pub fn record(&self, namespace: Namespace, id: &str) -> String {
        path::join(&self.namespace(namespace), id)
    }

    /// Every node the schema requires, parents before children.
    #[must_use]
    pub fn required(&self) -> Vec<String> {
        let mut required = vec![ROOT.to_string(), self.cluster_root.clone()];
        required.extend(Namespace::ALL.iter().map(|ns| self.namespace(*ns)));
        required
    }
}

/// What a bootstrap run changed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BootstrapOutcome {
    /// Namespace nodes created by this run; the others already existed.
    pub created: Vec<String>,

    /// Whether this run created the admin user.
    pub admin_created: bool,
}

/// Ensures the metadata schema and the admin user exist.
///
/// Every step tolerates a peer having done it first, so any number of servers
/// may bootstrap the same cluster concurrently.
pub struct SchemaBootstrapper<C>
where
    C: CoordinationService,
{
    client: MetadataStoreClient<C>,
    records: Records<C>,
    paths: SchemaPaths,
    initial_admin_password_hash: String,
}

impl<C> SchemaBootstrapper<C>
where
    C: CoordinationService,
{
    /// Creates a bootstrapper seeding the admin user with
    /// `initial_admin_password_hash` when it is absent.
    pub fn new(
        client: MetadataStoreClient<C>,
        paths: SchemaPaths,
        initial_admin_password_hash: String,
    ) -> Self {
        Self {
            records: Records::new(client.clone(), paths.clone()),
            client,
            paths,
            initial_admin_password_hash,
        }
    }

    /// Creates the required namespaces, in order, then the admin user if it
    /// is missing.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::PartialFailure`] if a namespace could not be created
    /// for any reason other than already existing, and
    /// [`BootstrapError::AdminUser`] if the admin user could not be checked or
    /// created.
    pub async fn ensure_schema(&self) -> Result<BootstrapOutcome, BootstrapError> {
        let mut outcome = BootstrapOutcome::default();
        let mut ensured = Vec::new();

        for node_path in self.paths.required() {
            match self.client.create_node(&node_path, Bytes::new()).await {
                Ok(()) => {
                    debug!("Created namespace {}", node_path);
                    outcome.created.push(node_path.clone());
                }
                Err(StoreError::AlreadyExists(_)) => {
                    debug!("Namespace {} already exists", node_path);
                }
                Err(source) => {
                    return Err(BootstrapError::PartialFailure {
                        path: node_path,
                        ensured,
                        source,
                    });
                }
            }
            ensured.push(node_path);
        }

        outcome.admin_created = self
            .ensure_admin_user()
            .await
            .map_err(BootstrapError::AdminUser)?;

        Ok(outcome)
    }

    /// The paths this bootstrapper works on.
    #[must_use]
    pub const fn paths(&self) -> &SchemaPaths {
        &self.paths
    }

    async fn ensure_admin_user(&self) -> Result<bool, RepositoryError> {
        if self.records.find::<User>(ADMIN_USER_ID).await?.is_some() {
            return Ok(false);
        }

        let admin = User::new(ADMIN_USER_ID, self.initial_admin_password_hash.clone(), true);
        match self.records.create(&admin).await {
            Ok(()) => {
                info!("Created initial admin user");
                Ok(true)
            }
            Err(RepositoryError::DuplicateEntity { .. }) => {
                debug!("Admin user created concurrently by a peer");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionHandler, SessionOptions, Transition};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use qdb_coordination::{ConnectString, CoordinationErrorKind};
    use qdb_coordination_memory::MemoryCoordination;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl SessionHandler for Noop {
        async fn on_transition(
            &self,
            _transition: Transition,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Ok(())
        }
    }

    async fn bootstrapper() -> (SchemaBootstrapper<MemoryCoordination>, MemoryCoordination) {
        let memory = MemoryCoordination::new();
        let options = SessionOptions::new(ConnectString::parse("127.0.0.1:2181").unwrap());
        let client = MetadataStoreClient::new(memory.clone(), options);
        client.start(Arc::new(Noop)).await.unwrap();

        let bootstrapper =
            SchemaBootstrapper::new(client, SchemaPaths::new("c1").unwrap(), "hash".to_string());
        (bootstrapper, memory)
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let (bootstrapper, _memory) = bootstrapper().await;

        let first = bootstrapper.ensure_schema().await.unwrap();
        assert_eq!(first.created, bootstrapper.paths().required());
        assert!(first.admin_created);

        let second = bootstrapper.ensure_schema().await.unwrap();
        assert_eq!(second, BootstrapOutcome::default());
    }

    #[tokio::test]
    async fn test_admin_created_by_peer_counts_as_success() {
        let (bootstrapper, memory) = bootstrapper().await;
        bootstrapper.ensure_schema().await.unwrap();

        // The existence check misses the admin record, so the create loses
        // the race against the copy already stored.
        memory
            .fail_reads("/qdb/c1/users/admin", CoordinationErrorKind::NoNode)
            .await;

        assert_matches!(
            bootstrapper.ensure_schema().await,
            Ok(BootstrapOutcome { admin_created: false, created }) if created.is_empty()
        );
    }

    #[tokio::test]
    async fn test_failed_namespace_names_path_and_ensured() {
        let (bootstrapper, memory) = bootstrapper().await;
        memory
            .fail_path("/qdb/c1/queues", CoordinationErrorKind::ConnectionLoss)
            .await;

        assert_matches!(
            bootstrapper.ensure_schema().await,
            Err(BootstrapError::PartialFailure { path, ensured, source: StoreError::Transient { .. } })
                if path == "/qdb/c1/queues"
                    && ensured == vec!["/qdb", "/qdb/c1", "/qdb/c1/nodes", "/qdb/c1/databases"]
        );
    }

    #[test]
    fn test_schema_paths() {
        let paths = SchemaPaths::new("c1").unwrap();

        assert_eq!(paths.cluster_root(), "/qdb/c1");
        assert_eq!(paths.namespace(Namespace::Users), "/qdb/c1/users");
        assert_eq!(paths.record(Namespace::Users, "admin"), "/qdb/c1/users/admin");
        assert_eq!(
            paths.required(),
            vec![
                "/qdb",
                "/qdb/c1",
                "/qdb/c1/nodes",
                "/qdb/c1/databases",
                "/qdb/c1/queues",
                "/qdb/c1/users",
            ]
        );
    }

    #[test]
    fn test_cluster_name_must_be_a_segment() {
        assert_matches!(
            SchemaPaths::new("a/b"),
            Err(RepositoryError::InvalidId { kind: "cluster", .. })
        );
        assert_matches!(SchemaPaths::new(""), Err(RepositoryError::InvalidId { .. }));
    }
}
