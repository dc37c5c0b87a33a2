//! Repository Layer - Core Traits
//!
//! Defines the abstract interface for data access.
//! Implementations can use a local key/value blob, a remote row-store, etc.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::domain::Entity;

/// Core repository trait for record storage
///
/// Generic over any Entity type.
/// All operations are async to support network backends.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert or replace the record with the entity's id
    async fn save(&self, entity: &T) -> RepositoryResult<()>;

    /// Find entity by ID, `None` when absent
    async fn get(&self, id: &T::Id) -> RepositoryResult<Option<T>>;

    /// List all entities
    async fn get_all(&self) -> RepositoryResult<Vec<T>>;

    /// Delete entity by ID, no-op when absent
    async fn delete(&self, id: &T::Id) -> RepositoryResult<()>;

    /// Remove every entity
    async fn clear_all(&self) -> RepositoryResult<()>;
}
