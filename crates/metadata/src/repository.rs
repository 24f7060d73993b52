//! Domain-facing metadata repository.

use std::error::Error as StdError;
use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use qdb_coordination::{ConnectionState, CoordinationService, path};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::records::Records;
use crate::schema::Namespace;
use crate::status::DEFAULT_CAPACITY;
use crate::{
    Database, MetadataStoreClient, Node, Queue, RepositoryError, RepositoryStatus,
    SchemaBootstrapper, SchemaPaths, SessionHandler, SessionOptions, StatusPublisher,
    StatusSubscription, Transition, User,
};

/// Cluster name used when none is configured.
pub const DEFAULT_CLUSTER_NAME: &str = "default";

/// Options for a [`Repository`].
#[derive(Clone, Debug)]
pub struct RepositoryOptions {
    /// Metadata store session options.
    pub session: SessionOptions,

    /// Name of the cluster, the segment under `/qdb` holding its metadata.
    pub cluster_name: String,

    /// Password hash given to the admin user when bootstrap creates it.
    pub initial_admin_password_hash: String,

    /// How many status events a slow subscriber may fall behind by.
    pub status_capacity: usize,
}

impl RepositoryOptions {
    /// Options for the default cluster.
    pub fn new<P: Into<String>>(session: SessionOptions, initial_admin_password_hash: P) -> Self {
        Self {
            session,
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            initial_admin_password_hash: initial_admin_password_hash.into(),
            status_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Reruns bootstrap on every transition into `Connected` and publishes the
/// resulting status. Ready is only published while the session that was
/// bootstrapped is still the latest one.
struct StatusTracker<C>
where
    C: CoordinationService,
{
    client: MetadataStoreClient<C>,
    bootstrapper: Arc<SchemaBootstrapper<C>>,
    publisher: StatusPublisher,
    transition_lock: Arc<Mutex<()>>,
}

#[async_trait]
impl<C> SessionHandler for StatusTracker<C>
where
    C: CoordinationService,
{
    async fn on_transition(
        &self,
        transition: Transition,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let _guard = self.transition_lock.lock().await;

        if transition.current != ConnectionState::Connected {
            self.publisher
                .publish(RepositoryStatus::not_ready(transition.current));
            return Ok(());
        }

        if !self.client.is_current(transition.generation) {
            debug!(
                generation = transition.generation,
                "Skipping bootstrap for superseded session"
            );
            return Ok(());
        }

        // Not ready until this session's bootstrap succeeds.
        self.publisher
            .publish(RepositoryStatus::not_ready(ConnectionState::Connected));

        let result = self.bootstrapper.ensure_schema().await;

        if !self.client.is_current(transition.generation) {
            info!(
                generation = transition.generation,
                "Session changed during schema bootstrap"
            );
            self.publisher
                .publish(RepositoryStatus::not_ready(self.client.connection_state()));
            return Ok(());
        }

        match result {
            Ok(outcome) => {
                info!(
                    cluster_root = self.bootstrapper.paths().cluster_root(),
                    created = outcome.created.len(),
                    admin_created = outcome.admin_created,
                    "Metadata schema ready"
                );
                self.publisher.publish(RepositoryStatus::ready_at(Utc::now()));
                Ok(())
            }
            Err(e) => {
                self.publisher
                    .publish(RepositoryStatus::bootstrap_failed(e.to_string()));
                Err(e.into())
            }
        }
    }
}

/// Persistence of cluster metadata.
///
/// Every store failure is translated into a [`RepositoryError`]. Status
/// reads never touch the coordination service.
pub struct Repository<C>
where
    C: CoordinationService,
{
    client: MetadataStoreClient<C>,
    records: Records<C>,
    bootstrapper: Arc<SchemaBootstrapper<C>>,
    publisher: StatusPublisher,
    transition_lock: Arc<Mutex<()>>,
}

impl<C> Repository<C>
where
    C: CoordinationService,
{
    /// Creates a repository over `service`. Nothing is connected until
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidId`] if the cluster name is not a
    /// valid path segment.
    pub fn new(service: C, options: RepositoryOptions) -> Result<Self, RepositoryError> {
        let paths = SchemaPaths::new(&options.cluster_name)?;
        let client = MetadataStoreClient::new(service, options.session);
        let bootstrapper = SchemaBootstrapper::new(
            client.clone(),
            paths.clone(),
            options.initial_admin_password_hash,
        );

        Ok(Self {
            records: Records::new(client.clone(), paths),
            client,
            bootstrapper: Arc::new(bootstrapper),
            publisher: StatusPublisher::new(options.status_capacity),
            transition_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Opens the metadata store session.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::StorageUnavailable`] if the session could
    /// not be opened.
    pub async fn start(&self) -> Result<(), RepositoryError> {
        info!(
            "Starting metadata repository for [{}]",
            self.bootstrapper.paths().cluster_root()
        );

        let tracker = StatusTracker {
            client: self.client.clone(),
            bootstrapper: Arc::clone(&self.bootstrapper),
            publisher: self.publisher.clone(),
            transition_lock: Arc::clone(&self.transition_lock),
        };

        self.client.start(Arc::new(tracker)).await?;
        Ok(())
    }

    /// Closes the session and publishes a final disconnected status.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;

        let _guard = self.transition_lock.lock().await;
        self.publisher
            .publish(RepositoryStatus::not_ready(ConnectionState::Disconnected));

        info!("Metadata repository stopped");
    }

    /// The latest status. Never blocks.
    #[must_use]
    pub fn get_status(&self) -> RepositoryStatus {
        self.publisher.current()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn subscribe(&self) -> StatusSubscription {
        self.publisher.subscribe()
    }

    /// The paths of this repository's schema.
    #[must_use]
    pub fn paths(&self) -> &SchemaPaths {
        self.bootstrapper.paths()
    }

    /// Looks up a user by id.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the read or the record is corrupt.
    pub async fn find_user(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        self.records.find(id).await
    }

    /// Persists a new user. The caller assigns the id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::DuplicateEntity`] if a user with the same id exists.
    pub async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.records.create(user).await
    }

    /// Lists users ordered by id, populated with the id only, skipping
    /// `offset` and returning at most `limit`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the users namespace is absent.
    pub async fn find_users(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<User>, RepositoryError> {
        let ids = self.records.list_ids(Namespace::Users).await?;

        Ok(ids
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(User::with_id_only)
            .collect())
    }

    /// Number of users.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the users namespace is absent.
    pub async fn count_users(&self) -> Result<usize, RepositoryError> {
        self.records.count(Namespace::Users).await
    }

    /// Registers a server node.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::DuplicateEntity`] if the node is already registered.
    pub async fn create_node(&self, node: &Node) -> Result<(), RepositoryError> {
        self.records.create(node).await
    }

    /// Looks up a server node by id.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the read or the record is corrupt.
    pub async fn find_node(&self, id: &str) -> Result<Option<Node>, RepositoryError> {
        self.records.find(id).await
    }

    /// Every registered node, ordered by id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the nodes namespace is absent.
    pub async fn find_nodes(&self) -> Result<Vec<Node>, RepositoryError> {
        self.records.list().await
    }

    /// Number of registered nodes.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the nodes namespace is absent.
    pub async fn count_nodes(&self) -> Result<usize, RepositoryError> {
        self.records.count(Namespace::Nodes).await
    }

    /// Persists a new database.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::DuplicateEntity`] if the id is taken.
    pub async fn create_database(&self, database: &Database) -> Result<(), RepositoryError> {
        self.records.create(database).await
    }

    /// Looks up a database by id.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the read or the record is corrupt.
    pub async fn find_database(&self, id: &str) -> Result<Option<Database>, RepositoryError> {
        self.records.find(id).await
    }

    /// Databases `user` may see, ordered by id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the databases namespace is absent.
    pub async fn find_databases_visible_to(
        &self,
        user: &User,
    ) -> Result<Vec<Database>, RepositoryError> {
        let databases = self.records.list::<Database>().await?;
        Ok(databases
            .into_iter()
            .filter(|db| db.is_visible_to(user))
            .collect())
    }

    /// Number of databases.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the databases namespace is absent.
    pub async fn count_databases(&self) -> Result<usize, RepositoryError> {
        self.records.count(Namespace::Databases).await
    }

    /// Persists a new queue.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::DuplicateEntity`] if the id is taken or the
    /// database already has a queue with the same name.
    pub async fn create_queue(&self, queue: &Queue) -> Result<(), RepositoryError> {
        if self.find_queue_by_name(&queue.database, &queue.name).await?.is_some() {
            return Err(RepositoryError::DuplicateEntity {
                kind: "queue",
                id: format!("{}/{}", queue.database, queue.name),
            });
        }

        self.records.create(queue).await
    }

    /// Queues of `database`, ordered by id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::SchemaMissing`] if the queues namespace is absent.
    pub async fn find_queues(&self, database: &str) -> Result<Vec<Queue>, RepositoryError> {
        let queues = self.records.list::<Queue>().await?;
        Ok(queues
            .into_iter()
            .filter(|q| q.database == database)
            .collect())
    }

    /// Looks up a queue of `database` by id, or failing that by name.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot serve the reads or a record is corrupt.
    pub async fn find_queue(
        &self,
        database: &str,
        name_or_id: &str,
    ) -> Result<Option<Queue>, RepositoryError> {
        if path::is_valid_segment(name_or_id) {
            if let Some(queue) = self.records.find::<Queue>(name_or_id).await? {
                if queue.database == database {
                    return Ok(Some(queue));
                }
            }
        }

        self.find_queue_by_name(database, name_or_id).await
    }

    async fn find_queue_by_name(
        &self,
        database: &str,
        name: &str,
    ) -> Result<Option<Queue>, RepositoryError> {
        let queues = self.find_queues(database).await?;
        Ok(queues.into_iter().find(|q| q.name == name))
    }
}

impl<C> Clone for Repository<C>
where
    C: CoordinationService,
{
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            records: self.records.clone(),
            bootstrapper: Arc::clone(&self.bootstrapper),
            publisher: self.publisher.clone(),
            transition_lock: Arc::clone(&self.transition_lock),
        }
    }
}

impl<C> Debug for Repository<C>
where
    C: CoordinationService,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("cluster_root", &self.paths().cluster_root())
            .field("client", &self.client)
            .field("status", &self.get_status())
            .finish_non_exhaustive()
    }
}
