//! Taskboard
//!
//! Task list state for a UI, backed by local storage or a cloud row-store:
//! - store: state container presentation code binds to
//! - config: persisted sync settings
//! - app: backend selection and startup

pub mod app;
pub mod config;
pub mod store;

pub use app::{build_backend, init_logging, launch, AppError, Backend, APP_NAME};
pub use config::{get_sync_config, remove_sync_config, save_sync_config, AppConfig, SyncConfig};
pub use store::{AppState, AppStore};
pub use taskboard_core::{Task, TaskId};
