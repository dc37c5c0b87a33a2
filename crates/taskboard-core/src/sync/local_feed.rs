//! In-process change feed, fed by `LocalTaskRepository` writes.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use super::{ChangeEvent, ChangeFeed, ChangeStream};
use crate::repository::RepositoryResult;

const DEFAULT_CAPACITY: usize = 64;

/// Broadcast feed shared by every subscriber in this process
#[derive(Debug, Clone)]
pub struct LocalChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Announce a change; dropped when nobody listens
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(&self) -> RepositoryResult<ChangeStream> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(e) => {
                    // The next event triggers a full re-read anyway
                    warn!(error = %e, "Local change feed lagged");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ChangeKind;

    fn event(kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            kind,
            table: "tasks".to_string(),
            record_id: Some("a".into()),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let feed = LocalChangeFeed::new();
        let mut first = feed.subscribe().await.unwrap();
        let mut second = feed.subscribe().await.unwrap();
        assert_eq!(feed.subscriber_count(), 2);

        feed.publish(event(ChangeKind::Insert));

        assert_eq!(first.next().await, Some(event(ChangeKind::Insert)));
        assert_eq!(second.next().await, Some(event(ChangeKind::Insert)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let feed = LocalChangeFeed::new();
        feed.publish(event(ChangeKind::Delete));

        let mut stream = feed.subscribe().await.unwrap();
        feed.publish(event(ChangeKind::Update));
        assert_eq!(stream.next().await, Some(event(ChangeKind::Update)));
    }

    #[tokio::test]
    async fn test_dropping_stream_unsubscribes() {
        let feed = LocalChangeFeed::new();
        let stream = feed.subscribe().await.unwrap();
        assert_eq!(feed.subscriber_count(), 1);
        drop(stream);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
