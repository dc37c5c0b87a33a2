//! Taskboard Core
//!
//! Layered architecture:
//! - domain: Task entity and domain rules
//! - repository: Storage abstraction with local and remote backends
//! - sync: Change feeds announcing table-level changes
//! - service: Task operations on top of a repository

pub mod domain;
pub mod repository;
pub mod service;
pub mod sync;

pub use domain::{DomainError, DomainResult, Entity, Task, TaskId};
pub use repository::{
    FileKeyValueStore, KeyValueStore, LocalTaskRepository, MemoryKeyValueStore,
    RemoteTaskRepository, Repository, RepositoryError, RepositoryResult, DEFAULT_STORAGE_KEY,
    DEFAULT_TABLE,
};
pub use service::{Operation, ServiceError, ServiceResult, Subscription, TaskService, TaskSnapshot};
pub use sync::{
    ChangeEvent, ChangeFeed, ChangeKind, ChangeStream, LocalChangeFeed, RealtimeChangeFeed,
    DEFAULT_CHANNEL,
};
