//! One mounted task list, driven in-process.
//!
//! [`TaskListSession`] is the list view without the pixels: it owns the one
//! live query for the tab on screen, keeps the last snapshot, and forwards
//! add/toggle/delete straight to the store. It never edits its own cache;
//! the store's next snapshot is the only way a mutation becomes visible.

use std::sync::Arc;

use chrono_tz::Tz;
use parking_lot::Mutex;
use shared::{
    MutationKind, NewTask, Tab, TaskError, TaskListState, TaskPatch, TaskQuery, DELETE_CONFIRMATION,
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::clock::Clock;
use crate::live::{self, Subscription};
use crate::store::TaskStore;

/// Blocking user-facing prompts.
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);

    fn confirm(&self, message: &str) -> bool;
}

pub struct TaskListSession<S: TaskStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    zone: Tz,
    notifier: Arc<dyn Notifier>,
    state: Arc<Mutex<TaskListState>>,
    revision: Arc<watch::Sender<u64>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<S: TaskStore + ?Sized> TaskListSession<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, zone: Tz, notifier: Arc<dyn Notifier>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            clock,
            zone,
            notifier,
            state: Arc::new(Mutex::new(TaskListState::default())),
            revision: Arc::new(revision),
            subscription: Mutex::new(None),
        }
    }

    /// Shows `tab`. The previous live query is closed before the new one
    /// opens, so at most one is ever running.
    pub fn open(&self, tab: Tab) {
        let mut current = self.subscription.lock();
        if let Some(previous) = current.take() {
            previous.unsubscribe();
        }

        let ticket = self.state.lock().open(tab);
        self.bump();

        let now = self.clock.now().with_timezone(&self.zone);
        let query = TaskQuery::for_tab(tab, &now);

        let on_snapshot = {
            let state = Arc::clone(&self.state);
            let revision = Arc::clone(&self.revision);
            move |tasks| {
                if state.lock().apply_snapshot(ticket, tasks) {
                    revision.send_modify(|r| *r += 1);
                }
            }
        };
        let on_error = {
            let state = Arc::clone(&self.state);
            let revision = Arc::clone(&self.revision);
            let notifier = Arc::clone(&self.notifier);
            move |err: crate::store::StoreError| {
                let err = TaskError::Subscription(err.to_string());
                let current = state.lock().apply_error(ticket, err.clone());
                if current {
                    notifier.alert(err.notice());
                    revision.send_modify(|r| *r += 1);
                }
            }
        };

        tracing::info!(%tab, "opening task list");
        *current = Some(live::subscribe(Arc::clone(&self.store), query, on_snapshot, on_error));
    }

    /// Leaves the view. Safe to call repeatedly.
    pub fn close(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    pub fn state(&self) -> TaskListState {
        self.state.lock().clone()
    }

    /// Ticks every time the view state changes.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn on_add_task(&self, text: &str) -> Result<(), TaskError> {
        let draft = NewTask::from_input(text, self.clock.now()).map_err(|e| self.report(e))?;
        self.store
            .insert(draft)
            .await
            .map(drop)
            .map_err(|e| self.report(TaskError::mutation(MutationKind::Add, e)))
    }

    /// Flips `completed` on a task from the current snapshot. Ids that are not
    /// on screen are ignored.
    pub async fn on_toggle_complete(&self, id: Uuid) -> Result<(), TaskError> {
        let patch = {
            let state = self.state.lock();
            state.find(id).map(TaskPatch::toggle)
        };
        let Some(patch) = patch else {
            tracing::debug!(task_id = %id, "toggle for a task not on screen");
            return Ok(());
        };
        self.store
            .update(id, patch)
            .await
            .map(drop)
            .map_err(|e| self.report(TaskError::mutation(MutationKind::Update, e)))
    }

    /// Deletes after the user confirms; declining is not an error.
    pub async fn on_delete_task(&self, id: Uuid) -> Result<(), TaskError> {
        if !self.notifier.confirm(DELETE_CONFIRMATION) {
            return Ok(());
        }
        self.store
            .delete(id)
            .await
            .map_err(|e| self.report(TaskError::mutation(MutationKind::Delete, e)))
    }

    fn report(&self, err: TaskError) -> TaskError {
        tracing::warn!(error = %err, "task list operation failed");
        self.notifier.alert(err.notice());
        err
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

impl<S: TaskStore + ?Sized> Drop for TaskListSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}
