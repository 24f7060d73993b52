//! Typed persistence of entities on top of the raw store client, with the
//! store-to-domain error mapping shared by the repository and the bootstrapper.

use qdb_coordination::{CoordinationService, path};
use tracing::debug;

use crate::codec;
use crate::schema::{Namespace, SchemaPaths};
use crate::{Entity, MetadataStoreClient, RepositoryError, StoreError};

pub struct Records<C>
where
    C: CoordinationService,
{
    client: MetadataStoreClient<C>,
    paths: SchemaPaths,
}

impl<C> Records<C>
where
    C: CoordinationService,
{
    pub const fn new(client: MetadataStoreClient<C>, paths: SchemaPaths) -> Self {
        Self { client, paths }
    }

    pub async fn find<E: Entity>(&self, id: &str) -> Result<Option<E>, RepositoryError> {
        let record_path = self.record_path::<E>(id)?;

        match self.client.get_node(&record_path).await {
            Ok(body) => codec::decode(&record_path, &body).map(Some),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create<E: Entity>(&self, entity: &E) -> Result<(), RepositoryError> {
        let record_path = self.record_path::<E>(entity.id())?;
        let body = codec::encode(&record_path, entity)?;

        match self.client.create_node(&record_path, body).await {
            Ok(()) => {
                debug!("Created {} [{}]", E::KIND, entity.id());
                Ok(())
            }
            Err(StoreError::AlreadyExists(_)) => Err(RepositoryError::DuplicateEntity {
                kind: E::KIND,
                id: entity.id().to_string(),
            }),
            Err(StoreError::NotFound(_)) => Err(RepositoryError::SchemaMissing(
                self.paths.namespace(E::NAMESPACE),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Sorted ids of every record in `namespace`.
    pub async fn list_ids(&self, namespace: Namespace) -> Result<Vec<String>, RepositoryError> {
        let namespace_path = self.paths.namespace(namespace);

        match self.client.list_children(&namespace_path).await {
            Ok(ids) => Ok(ids),
            Err(StoreError::NotFound(_)) => Err(RepositoryError::SchemaMissing(namespace_path)),
            Err(e) => Err(e.into()),
        }
    }

    /// Every record in the namespace of `E`, ordered by id.
    pub async fn list<E: Entity>(&self) -> Result<Vec<E>, RepositoryError> {
        let mut entities = Vec::new();

        for id in self.list_ids(E::NAMESPACE).await? {
            // Skip records that vanished between listing and reading.
            if let Some(entity) = self.find::<E>(&id).await? {
                entities.push(entity);
            }
        }

        Ok(entities)
    }

    pub async fn count(&self, namespace: Namespace) -> Result<usize, RepositoryError> {
        let namespace_path = self.paths.namespace(namespace);

        match self.client.child_count(&namespace_path).await {
            Ok(count) => Ok(count),
            Err(StoreError::NotFound(_)) => Err(RepositoryError::SchemaMissing(namespace_path)),
            Err(e) => Err(e.into()),
        }
    }

    fn record_path<E: Entity>(&self, id: &str) -> Result<String, RepositoryError> {
        if !path::is_valid_segment(id) {
            return Err(RepositoryError::InvalidId {
                kind: E::KIND,
                id: id.to_string(),
            });
        }

        Ok(self.paths.record(E::NAMESPACE, id))
    }
}

impl<C> Clone for Records<C>
where
    C: CoordinationService,
{
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            paths: self.paths.clone(),
        }
    }
}
