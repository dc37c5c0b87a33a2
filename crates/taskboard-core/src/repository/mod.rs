//! Repository Layer
//!
//! Data access abstractions and implementations.

mod error;
mod kv;
mod local_repo;
mod remote_repo;
mod traits;

#[cfg(test)]
mod tests;

pub use error::{RepositoryError, RepositoryResult};
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use local_repo::{LocalTaskRepository, DEFAULT_STORAGE_KEY};
pub use remote_repo::{RemoteTaskRepository, DEFAULT_TABLE};
pub use traits::Repository;
