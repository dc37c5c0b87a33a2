//! Local Task Repository
//!
//! Keeps the whole collection as one JSON array under a single key.
//! Every read deserializes the full array and every write reserializes it,
//! so each operation is O(n). Fine for a personal list, not for large ones.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::error::{RepositoryError, RepositoryResult};
use super::kv::{FileKeyValueStore, KeyValueStore};
use super::traits::Repository;
use crate::domain::{Entity, Task, TaskId};
use crate::sync::{ChangeEvent, ChangeKind, LocalChangeFeed};

/// Key holding the serialized task array
pub const DEFAULT_STORAGE_KEY: &str = "taskboard.tasks";

/// Table name reported in change events
const TABLE: &str = "tasks";

/// Key/value-backed implementation of the task repository
pub struct LocalTaskRepository<S = FileKeyValueStore> {
    store: S,
    key: String,
    quota: Option<usize>,
    feed: Option<LocalChangeFeed>,
    // Serializes read-modify-write cycles on the blob
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> LocalTaskRepository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            key: DEFAULT_STORAGE_KEY.to_string(),
            quota: None,
            feed: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Reject writes whose serialized collection exceeds `bytes`
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Publish a change event after every successful write
    pub fn with_change_feed(mut self, feed: LocalChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    fn read_all(&self) -> RepositoryResult<Vec<Task>> {
        match self.store.get_item(&self.key)? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&self, tasks: &[Task]) -> RepositoryResult<()> {
        let blob = serde_json::to_string(tasks)?;
        if let Some(quota) = self.quota {
            if blob.len() > quota {
                return Err(RepositoryError::QuotaExceeded {
                    size: blob.len(),
                    quota,
                });
            }
        }
        self.store.set_item(&self.key, &blob)
    }

    fn notify(&self, kind: ChangeKind, record_id: Option<TaskId>) {
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent {
                kind,
                table: TABLE.to_string(),
                record_id,
            });
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> Repository<Task> for LocalTaskRepository<S> {
    async fn save(&self, entity: &Task) -> RepositoryResult<()> {
        let kind = {
            let _guard = self.write_lock.lock();
            let mut tasks = self.read_all()?;
            let kind = match tasks.iter_mut().find(|t| t.id() == entity.id()) {
                Some(existing) => {
                    *existing = entity.clone();
                    ChangeKind::Update
                }
                None => {
                    tasks.push(entity.clone());
                    ChangeKind::Insert
                }
            };
            self.write_all(&tasks)?;
            kind
        };
        debug!(task_id = %entity.id(), ?kind, "Task saved locally");
        self.notify(kind, Some(entity.id().clone()));
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> RepositoryResult<Option<Task>> {
        Ok(self.read_all()?.into_iter().find(|t| t.id() == id))
    }

    async fn get_all(&self) -> RepositoryResult<Vec<Task>> {
        self.read_all()
    }

    async fn delete(&self, id: &TaskId) -> RepositoryResult<()> {
        {
            let _guard = self.write_lock.lock();
            let mut tasks = self.read_all()?;
            let before = tasks.len();
            tasks.retain(|t| t.id() != id);
            if tasks.len() == before {
                return Ok(());
            }
            self.write_all(&tasks)?;
        }
        debug!(task_id = %id, "Task deleted locally");
        self.notify(ChangeKind::Delete, Some(id.clone()));
        Ok(())
    }

    async fn clear_all(&self) -> RepositoryResult<()> {
        {
            let _guard = self.write_lock.lock();
            self.store.remove_item(&self.key)?;
        }
        debug!("Local task storage cleared");
        self.notify(ChangeKind::Delete, None);
        Ok(())
    }
}
