//! App bootstrap
//!
//! Picks the storage backend from configuration and wires the store:
//! - sync configured: remote row-store plus its realtime channel
//! - otherwise: JSON blob in the data directory plus an in-process feed

use std::sync::Arc;

use taskboard_core::{
    ChangeFeed, FileKeyValueStore, LocalChangeFeed, LocalTaskRepository, RealtimeChangeFeed,
    RemoteTaskRepository, Repository, RepositoryError, Task, TaskService,
};
use thiserror::Error;
use tracing::info;

use crate::config::{AppConfig, ConfigError};
use crate::store::AppStore;

/// Name used for log files
pub const APP_NAME: &str = "Taskboard";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Logger(#[from] rolling_logger::LoggerError),
}

/// Service plus the feed that keeps stores current
#[derive(Clone)]
pub struct Backend {
    pub service: TaskService,
    pub feed: Option<Arc<dyn ChangeFeed>>,
}

impl Backend {
    /// A fresh, unmounted store over this backend
    pub fn store(&self) -> AppStore {
        match &self.feed {
            Some(feed) => AppStore::with_change_feed(self.service.clone(), Arc::clone(feed)),
            None => AppStore::new(self.service.clone()),
        }
    }
}

/// Build the backend selected by `config`
pub fn build_backend(config: &AppConfig) -> Result<Backend, AppError> {
    if let Some(sync) = &config.sync {
        info!(url = %sync.url, table = %sync.table, "Using cloud storage");
        let repository: Arc<dyn Repository<Task>> =
            Arc::new(RemoteTaskRepository::new(&sync.url, sync.token.clone(), &sync.table));
        let feed = RealtimeChangeFeed::new(&sync.url, &sync.token, &sync.channel, &sync.table)?;
        return Ok(Backend {
            service: TaskService::new(repository),
            feed: Some(Arc::new(feed)),
        });
    }

    info!(dir = %config.data_dir.display(), "Using local storage");
    let feed = LocalChangeFeed::new();
    let mut repository = LocalTaskRepository::new(FileKeyValueStore::new(&config.data_dir))
        .with_key(config.storage_key.clone())
        .with_change_feed(feed.clone());
    if let Some(quota) = config.storage_quota_bytes {
        repository = repository.with_quota(quota);
    }
    Ok(Backend {
        service: TaskService::new(Arc::new(repository)),
        feed: Some(Arc::new(feed)),
    })
}

/// Start file logging under `config.log_dir`
pub fn init_logging(config: &AppConfig) -> Result<(), AppError> {
    rolling_logger::init_logger(&config.log_dir, APP_NAME)?;
    Ok(())
}

/// Build the backend and return a mounted store
pub async fn launch(config: &AppConfig) -> Result<AppStore, AppError> {
    let backend = build_backend(config)?;
    let store = backend.store();
    store.mount().await;
    info!(tasks = store.state().tasks.len(), "Task board ready");
    Ok(store)
}
