//! In-process task collection.
//!
//! Used by tests and by `TASKLIST_STORE=memory`. Documents are kept in
//! insertion order. Reads and writes can be made to fail on demand to
//! exercise error paths.

use async_trait::async_trait;
use shared::{NewTask, Task, TaskPatch, TaskQuery};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{StoreError, TaskStore, CHANGE_CHANNEL_CAPACITY};

#[derive(Debug, Default)]
struct MemoryState {
    tasks: Vec<Task>,
    fail_reads: bool,
    fail_writes: bool,
}

pub struct MemoryStore {
    state: RwLock<MemoryState>,
    changed: broadcast::Sender<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changed, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(MemoryState::default()),
            changed,
        }
    }

    /// While set, every read fails with `Unavailable`.
    pub async fn fail_reads(&self, fail: bool) {
        self.state.write().await.fail_reads = fail;
    }

    /// While set, every write fails with `Unavailable` and changes nothing.
    pub async fn fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }

    /// Wakes every reader without changing anything, as a remote store does
    /// when a write lands that no local query cares about.
    pub fn touch(&self) {
        self.notify();
    }

    /// Number of open change listeners, i.e. live queries still running.
    pub fn watchers(&self) -> usize {
        self.changed.receiver_count()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn notify(&self) {
        // No receivers just means nobody is watching.
        let _ = self.changed.send(());
    }
}

fn check_writable(state: &MemoryState) -> Result<(), StoreError> {
    if state.fail_writes {
        return Err(StoreError::Unavailable("writes are failing".into()));
    }
    Ok(())
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn query(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        if state.fail_reads {
            return Err(StoreError::Unavailable("reads are failing".into()));
        }
        Ok(query.evaluate(state.tasks.iter().cloned()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let state = self.state.read().await;
        if state.fail_reads {
            return Err(StoreError::Unavailable("reads are failing".into()));
        }
        Ok(state.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        check_writable(&state)?;
        if task.text.trim().is_empty() {
            return Err(StoreError::Invalid("text must not be empty".into()));
        }

        let task = task.into_task(Uuid::new_v4());
        state.tasks.push(task.clone());
        drop(state);

        tracing::debug!(task_id = %task.id, "task inserted");
        self.notify();
        Ok(task)
    }

    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        check_writable(&state)?;

        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let mut updated = task.clone();
        patch
            .apply_to(&mut updated)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        *task = updated.clone();
        drop(state);

        tracing::debug!(task_id = %id, "task updated");
        self.notify();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        check_writable(&state)?;

        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        if state.tasks.len() == before {
            return Err(StoreError::NotFound(id));
        }
        drop(state);

        tracing::debug!(task_id = %id, "task deleted");
        self.notify();
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }
}
