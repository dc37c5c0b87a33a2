//! Domain Layer
//!
//! Contains the task entity and core abstractions.
//! This layer has no I/O (serde is used only for the record shape).

mod entity;
mod task;

pub use entity::{DomainError, DomainResult, Entity};
pub use task::{Task, TaskId};
