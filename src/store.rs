//! Application State Store
//!
//! Holds the task list presentation code renders, plus loading and error
//! flags. Every user action goes through the service; failures land in
//! `AppState::error` and never propagate further.
//!
//! Snapshot ordering: a full list is stamped with the instant its read was
//! issued, an optimistic patch with the instant its write returned. A full
//! list replaces the current one only when its stamp is strictly newer than
//! the last applied change, so a read that may predate a patched write
//! cannot undo the patch. Patches always apply.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use taskboard_core::{
    ChangeFeed, Entity, ServiceResult, Subscription, Task, TaskId, TaskService, TaskSnapshot,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What presentation code renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    /// Current task list
    pub tasks: Vec<Task>,
    /// At least one action is in flight
    pub is_loading: bool,
    /// Message of the last failed action, cleared when the next one starts
    pub error: Option<String>,
    pending: usize,
    stamp: Option<Instant>,
}

impl AppState {
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }
}

type StateSender = Arc<watch::Sender<AppState>>;

struct Inner {
    service: TaskService,
    feed: Option<Arc<dyn ChangeFeed>>,
    state: StateSender,
    subscription: Mutex<Option<Subscription>>,
}

/// Handle to the application state; clones share the same state
#[derive(Clone)]
pub struct AppStore {
    inner: Arc<Inner>,
}

impl AppStore {
    pub fn new(service: TaskService) -> Self {
        Self::build(service, None)
    }

    /// Store that keeps itself current from `feed` once mounted
    pub fn with_change_feed(service: TaskService, feed: Arc<dyn ChangeFeed>) -> Self {
        Self::build(service, Some(feed))
    }

    fn build(service: TaskService, feed: Option<Arc<dyn ChangeFeed>>) -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self {
            inner: Arc::new(Inner {
                service,
                feed,
                state: Arc::new(state),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> AppState {
        self.inner.state.borrow().clone()
    }

    /// Receiver woken on every state change
    pub fn watch(&self) -> watch::Receiver<AppState> {
        self.inner.state.subscribe()
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Load the task list and start live updates when a feed is configured
    pub async fn mount(&self) {
        self.fetch_tasks().await;
        if let Some(feed) = self.inner.feed.clone() {
            self.subscribe(feed.as_ref()).await;
        }
    }

    /// Stop live updates
    pub fn teardown(&self) {
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.cancel();
            debug!("Live updates stopped");
        }
    }

    async fn subscribe(&self, feed: &dyn ChangeFeed) {
        let state = Arc::clone(&self.inner.state);
        let result = self
            .inner
            .service
            .subscribe_changes(feed, move |snapshot| {
                apply_snapshot(&state, snapshot);
            })
            .await;

        match result {
            Ok(subscription) => {
                if let Some(previous) = self.inner.subscription.lock().replace(subscription) {
                    previous.cancel();
                }
                info!("Live updates started");
            }
            // Best effort: the list still works, it just will not follow other clients
            Err(e) => warn!(error = %e, "Live updates unavailable"),
        }
    }

    /// Re-read the whole list
    pub async fn fetch_tasks(&self) {
        self.track(self.refresh()).await;
    }

    /// Create a task, then re-read the list. Blank titles are rejected here
    /// and never reach the service.
    pub async fn add_task(&self, title: &str, description: Option<&str>) {
        let title = match Task::validate_title(title) {
            Ok(title) => title.to_string(),
            Err(e) => {
                self.inner.state.send_modify(|s| s.error = Some(e.to_string()));
                return;
            }
        };
        let description = description.map(str::to_string);

        self.track(async {
            self.inner.service.add_task(title, description).await?;
            self.refresh().await
        })
        .await;
    }

    /// Complete a task and patch it in place
    pub async fn complete_task(&self, id: &TaskId) {
        self.track(async {
            if let Some(updated) = self.inner.service.complete_task(id).await? {
                let stamp = Instant::now();
                apply_patch(&self.inner.state, stamp, |tasks| {
                    store_update_task(tasks, updated)
                });
            }
            Ok(())
        })
        .await;
    }

    /// Delete a task and drop it from the list
    pub async fn delete_task(&self, id: &TaskId) {
        self.track(async {
            self.inner.service.delete_task(id).await?;
            let stamp = Instant::now();
            apply_patch(&self.inner.state, stamp, |tasks| store_remove_task(tasks, id));
            Ok(())
        })
        .await;
    }

    /// Replace a task, then re-read the list
    pub async fn edit_task(&self, task: Task) {
        self.track(async {
            self.inner.service.edit_task(&task).await?;
            self.refresh().await
        })
        .await;
    }

    /// Remove every task
    pub async fn reset_tasks(&self) {
        self.track(async {
            self.inner.service.reset_tasks().await?;
            let stamp = Instant::now();
            apply_patch(&self.inner.state, stamp, Vec::clear);
            Ok(())
        })
        .await;
    }

    async fn refresh(&self) -> ServiceResult<()> {
        let snapshot = self.inner.service.snapshot().await?;
        apply_snapshot(&self.inner.state, snapshot);
        Ok(())
    }

    /// Run one action under the loading / error protocol
    async fn track<F>(&self, action: F)
    where
        F: Future<Output = ServiceResult<()>>,
    {
        self.inner.state.send_modify(|s| {
            s.pending += 1;
            s.is_loading = true;
            s.error = None;
        });

        let failure = action.await.err().map(|e| e.to_string());

        self.inner.state.send_modify(|s| {
            s.pending = s.pending.saturating_sub(1);
            s.is_loading = s.pending > 0;
            if failure.is_some() {
                s.error = failure;
            }
        });
    }
}

// ========================
// Store Helper Functions
// ========================

/// Replace the task list unless a newer change was already applied
fn apply_snapshot(state: &watch::Sender<AppState>, snapshot: TaskSnapshot) -> bool {
    state.send_if_modified(|s| {
        if s.stamp.is_some_and(|last| snapshot.requested_at <= last) {
            debug!("Discarding stale task snapshot");
            return false;
        }
        s.tasks = snapshot.tasks;
        s.stamp = Some(snapshot.requested_at);
        true
    })
}

/// Edit the task list in place
fn apply_patch(state: &watch::Sender<AppState>, stamp: Instant, patch: impl FnOnce(&mut Vec<Task>)) {
    state.send_modify(|s| {
        patch(&mut s.tasks);
        s.stamp = Some(s.stamp.map_or(stamp, |last| last.max(stamp)));
    });
}

/// Update a task in the list by ID
fn store_update_task(tasks: &mut [Task], updated: Task) {
    if let Some(task) = tasks.iter_mut().find(|t| t.id() == updated.id()) {
        *task = updated;
    }
}

/// Remove a task from the list by ID
fn store_remove_task(tasks: &mut Vec<Task>, id: &TaskId) {
    tasks.retain(|t| t.id() != id);
}
