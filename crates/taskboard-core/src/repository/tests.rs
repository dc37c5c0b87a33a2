//! Repository Integration Tests
//!
//! Tests for LocalTaskRepository over memory and file key/value stores.

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use crate::domain::{Entity, Task, TaskId};
    use crate::repository::{
        FileKeyValueStore, KeyValueStore, LocalTaskRepository, MemoryKeyValueStore, Repository,
        RepositoryError, DEFAULT_STORAGE_KEY,
    };
    use crate::sync::{ChangeFeed, ChangeKind, LocalChangeFeed};

    fn setup_memory_repo() -> LocalTaskRepository<MemoryKeyValueStore> {
        LocalTaskRepository::new(MemoryKeyValueStore::new())
    }

    #[tokio::test]
    async fn test_save_then_get_roundtrip() {
        let repo = setup_memory_repo();
        let task = Task::new("Buy milk", Some("2 litres".to_string())).complete();

        repo.save(&task).await.expect("Failed to save");

        let found = repo.get(task.id()).await.expect("Get failed");
        assert_eq!(found, Some(task));
    }

    #[tokio::test]
    async fn test_file_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::new("Persisted", None);

        LocalTaskRepository::new(FileKeyValueStore::new(dir.path()))
            .save(&task)
            .await
            .unwrap();

        let reopened = LocalTaskRepository::new(FileKeyValueStore::new(dir.path()));
        let all = reopened.get_all().await.unwrap();
        assert_eq!(all, vec![task]);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let repo = setup_memory_repo();
        let found = repo.get(&TaskId::from("nope")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let repo = setup_memory_repo();
        let task = Task::new("Original", None);
        repo.save(&task).await.unwrap();

        let edited = task.clone().with_title("Updated");
        repo.save(&edited).await.unwrap();
        repo.save(&edited).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Updated");
    }

    #[tokio::test]
    async fn test_get_all_keeps_insertion_order() {
        let repo = setup_memory_repo();
        let first = Task::new("first", None);
        let second = Task::new("second", None);
        let third = Task::new("third", None);
        for task in [&first, &second, &third] {
            repo.save(task).await.unwrap();
        }
        // Replacing keeps the original slot
        repo.save(&second.complete()).await.unwrap();

        let titles: Vec<_> = repo
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = setup_memory_repo();
        let keep = Task::new("keep", None);
        let gone = Task::new("gone", None);
        repo.save(&keep).await.unwrap();
        repo.save(&gone).await.unwrap();

        repo.delete(gone.id()).await.expect("Delete failed");
        repo.delete(gone.id()).await.expect("Second delete failed");

        let all = repo.get_all().await.unwrap();
        assert_eq!(all, vec![keep]);
    }

    #[tokio::test]
    async fn test_clear_all_empties_store() {
        let repo = setup_memory_repo();
        repo.save(&Task::new("a", None)).await.unwrap();
        repo.save(&Task::new("b", None)).await.unwrap();

        repo.clear_all().await.unwrap();
        assert!(repo.get_all().await.unwrap().is_empty());

        // Clearing an empty store is fine too
        repo.clear_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_key() {
        let store = MemoryKeyValueStore::new();
        let repo = LocalTaskRepository::new(store).with_key("other.tasks");
        repo.save(&Task::new("a", None)).await.unwrap();
        assert_eq!(repo.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_quota_rejects_write_and_keeps_blob() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalTaskRepository::new(FileKeyValueStore::new(dir.path())).with_quota(400);

        let small = Task::new("small", None);
        repo.save(&small).await.unwrap();

        let big = Task::new("big", Some("x".repeat(500)));
        let err = repo.save(&big).await.unwrap_err();
        assert!(matches!(err, RepositoryError::QuotaExceeded { quota: 400, .. }));

        assert_eq!(repo.get_all().await.unwrap(), vec![small]);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_an_error() {
        let store = MemoryKeyValueStore::new();
        store.set_item(DEFAULT_STORAGE_KEY, "{not json").unwrap();
        let repo = LocalTaskRepository::new(store);

        assert!(matches!(
            repo.get_all().await,
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_publish_changes() {
        let feed = LocalChangeFeed::new();
        let changes = feed.subscribe().await.unwrap();
        let repo = setup_memory_repo().with_change_feed(feed);

        let task = Task::new("watched", None);
        repo.save(&task).await.unwrap();
        repo.save(&task.complete()).await.unwrap();
        repo.delete(&TaskId::from("absent")).await.unwrap();
        repo.delete(task.id()).await.unwrap();
        repo.clear_all().await.unwrap();

        let kinds: Vec<_> = changes.take(4).map(|e| e.kind).collect().await;
        assert_eq!(
            kinds,
            [
                ChangeKind::Insert,
                ChangeKind::Update,
                ChangeKind::Delete,
                ChangeKind::Delete
            ]
        );
    }
}
