//! Task Entity
//!
//! Represents a single to-do record.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::{DomainError, DomainResult, Entity};

/// Opaque task identifier, generated client-side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A to-do item
///
/// `id` and `created_at` are fixed at creation. The completion flag only moves
/// from `false` to `true`, through [`Task::complete`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    /// Short title shown in lists
    pub title: String,
    /// Optional free-text notes
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    is_completed: bool,
    created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new, not yet completed task with a fresh id and timestamp
    pub fn new(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: TaskId::generate(),
            title: title.into(),
            description: description.filter(|d| !d.trim().is_empty()),
            is_completed: false,
            // Row-store timestamps keep microseconds; truncate so records round-trip.
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// Check a title before a task is created from it
    pub fn validate_title(title: &str) -> DomainResult<&str> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidInput(
                "task title must not be empty".to_string(),
            ));
        }
        Ok(trimmed)
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Copy of this task with the completion flag set
    pub fn complete(&self) -> Self {
        Self {
            is_completed: true,
            ..self.clone()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }
}

impl Entity for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
