//! Change Feeds
//!
//! Streams of table-level change notifications. Consumers treat every event
//! as "something changed" and re-read the table; no delivery guarantee.

mod local_feed;
mod realtime;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::TaskId;
use crate::repository::RepositoryResult;

pub use local_feed::LocalChangeFeed;
pub use realtime::{RealtimeChangeFeed, DEFAULT_CHANNEL};

/// Stream of change events for one subscriber
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Other,
}

impl ChangeKind {
    /// Map a row-store event type (`INSERT`, `update`, ...)
    pub fn from_event_type(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "DELETE" => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }
}

/// One change on the task table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    /// Affected record, when the source reports it
    pub record_id: Option<TaskId>,
}

/// Source of change notifications
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a new subscription; dropping the stream ends it
    async fn subscribe(&self) -> RepositoryResult<ChangeStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_mapping() {
        assert_eq!(ChangeKind::from_event_type("INSERT"), ChangeKind::Insert);
        assert_eq!(ChangeKind::from_event_type("update"), ChangeKind::Update);
        assert_eq!(ChangeKind::from_event_type("DELETE"), ChangeKind::Delete);
        assert_eq!(ChangeKind::from_event_type("TRUNCATE"), ChangeKind::Other);
        assert_eq!(ChangeKind::from_event_type(""), ChangeKind::Other);
    }
}
