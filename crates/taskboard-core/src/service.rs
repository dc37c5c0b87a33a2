//! Task Service
//!
//! Turns user intents into repository calls. Failures are logged with the
//! operation that failed and handed back to the caller; nothing is retried.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{Entity, Task, TaskId};
use crate::repository::{Repository, RepositoryError};
use crate::sync::ChangeFeed;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service operations, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Complete,
    Delete,
    Edit,
    Fetch,
    Reset,
    Subscribe,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add task",
            Operation::Complete => "complete task",
            Operation::Delete => "delete task",
            Operation::Edit => "edit task",
            Operation::Fetch => "fetch tasks",
            Operation::Reset => "reset tasks",
            Operation::Subscribe => "subscribe to task changes",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repository failure, labelled with the operation it aborted
#[derive(Debug, Error)]
#[error("Could not {operation}: {source}")]
pub struct ServiceError {
    pub operation: Operation,
    #[source]
    pub source: RepositoryError,
}

impl ServiceError {
    fn logged(operation: Operation, source: RepositoryError) -> Self {
        error!(%operation, error = %source, "Task operation failed");
        Self { operation, source }
    }
}

/// Full task list plus the moment the read behind it was issued
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub requested_at: Instant,
}

/// Live-update subscription; cancelled on drop
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop the refresh loop now
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Task operations over a repository
#[derive(Clone)]
pub struct TaskService {
    repository: Arc<dyn Repository<Task>>,
}

impl TaskService {
    pub fn new(repository: Arc<dyn Repository<Task>>) -> Self {
        Self { repository }
    }

    /// Create and persist a new task
    pub async fn add_task(
        &self,
        title: impl Into<String>,
        description: Option<String>,
    ) -> ServiceResult<Task> {
        let task = Task::new(title, description);
        self.repository
            .save(&task)
            .await
            .map_err(|e| ServiceError::logged(Operation::Add, e))?;
        info!(task_id = %task.id(), "Task added");
        Ok(task)
    }

    /// Mark a task completed. A task that no longer exists is skipped:
    /// `Ok(None)` and a warning, not an error.
    pub async fn complete_task(&self, id: &TaskId) -> ServiceResult<Option<Task>> {
        let current = self
            .repository
            .get(id)
            .await
            .map_err(|e| ServiceError::logged(Operation::Complete, e))?;

        let Some(current) = current else {
            warn!(task_id = %id, "Task to complete was not found");
            return Ok(None);
        };

        let completed = current.complete();
        self.repository
            .save(&completed)
            .await
            .map_err(|e| ServiceError::logged(Operation::Complete, e))?;
        info!(task_id = %id, "Task completed");
        Ok(Some(completed))
    }

    pub async fn delete_task(&self, id: &TaskId) -> ServiceResult<()> {
        self.repository
            .delete(id)
            .await
            .map_err(|e| ServiceError::logged(Operation::Delete, e))?;
        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Replace the stored record with `task`
    pub async fn edit_task(&self, task: &Task) -> ServiceResult<()> {
        self.repository
            .save(task)
            .await
            .map_err(|e| ServiceError::logged(Operation::Edit, e))?;
        info!(task_id = %task.id(), "Task edited");
        Ok(())
    }

    pub async fn get_tasks(&self) -> ServiceResult<Vec<Task>> {
        self.repository
            .get_all()
            .await
            .map_err(|e| ServiceError::logged(Operation::Fetch, e))
    }

    /// Read all tasks, stamped with the instant the read was issued
    pub async fn snapshot(&self) -> ServiceResult<TaskSnapshot> {
        let requested_at = Instant::now();
        let tasks = self.get_tasks().await?;
        Ok(TaskSnapshot {
            tasks,
            requested_at,
        })
    }

    /// Remove every task
    pub async fn reset_tasks(&self) -> ServiceResult<()> {
        self.repository
            .clear_all()
            .await
            .map_err(|e| ServiceError::logged(Operation::Reset, e))?;
        info!("All tasks reset");
        Ok(())
    }

    /// Re-read all tasks on every change event and hand the result to
    /// `on_change`.
    ///
    /// Best effort: a failed re-read is logged and skipped, events missed
    /// while disconnected are not replayed. Runs until the returned
    /// [`Subscription`] is cancelled or dropped, or the feed ends.
    pub async fn subscribe_changes<F>(
        &self,
        feed: &dyn ChangeFeed,
        on_change: F,
    ) -> ServiceResult<Subscription>
    where
        F: Fn(TaskSnapshot) + Send + Sync + 'static,
    {
        let mut changes = feed
            .subscribe()
            .await
            .map_err(|e| ServiceError::logged(Operation::Subscribe, e))?;

        let service = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = changes.next().await {
                debug!(kind = ?event.kind, table = %event.table, "Change received, refreshing tasks");
                match service.snapshot().await {
                    Ok(snapshot) => on_change(snapshot),
                    Err(e) => warn!(error = %e, "Refresh after change failed"),
                }
            }
            debug!("Change feed ended");
        });

        Ok(Subscription { handle })
    }
}
