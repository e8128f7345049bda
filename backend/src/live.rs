//! Live queries.
//!
//! A live query re-evaluates its [`TaskQuery`] every time the store reports a
//! write and hands the full result set to its observer whenever that result
//! set differs from the last one delivered. A failed read ends the
//! subscription after reporting the error once; there is no retry here.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use shared::{Task, TaskQuery};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;

use crate::store::{StoreError, TaskStore};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Cancellation handle for a live query. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl Subscription {
    /// True until the subscription is cancelled or has reported an error.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops all further deliveries. Calling it again, or after an error was
    /// delivered, does nothing.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::debug!(subscription = self.id, "live query closed");
        }
        self.abort.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Opens a live query. `on_snapshot` receives the initial result set and
/// every changed one after it; `on_error` is called at most once.
pub fn subscribe<S, F, E>(
    store: Arc<S>,
    query: TaskQuery,
    mut on_snapshot: F,
    on_error: E,
) -> Subscription
where
    S: TaskStore + ?Sized,
    F: FnMut(Vec<Task>) + Send + 'static,
    E: FnOnce(StoreError) + Send + 'static,
{
    let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
    let active = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&active);

    // Listen before the first read so no write can slip in between.
    let mut changes = store.changes();

    let handle = tokio::spawn(async move {
        let mut last: Option<Vec<Task>> = None;
        loop {
            match store.query(&query).await {
                Ok(tasks) => {
                    if last.as_ref() != Some(&tasks) {
                        if !flag.load(Ordering::Acquire) {
                            return;
                        }
                        tracing::trace!(subscription = id, count = tasks.len(), "snapshot");
                        on_snapshot(tasks.clone());
                        last = Some(tasks);
                    }
                }
                Err(err) => {
                    if flag.swap(false, Ordering::AcqRel) {
                        tracing::warn!(subscription = id, error = %err, "live query failed");
                        on_error(err);
                    }
                    return;
                }
            }

            if !wait_for_change(&mut changes).await {
                tracing::debug!(subscription = id, "store change feed closed");
                flag.store(false, Ordering::Release);
                return;
            }
        }
    });

    tracing::debug!(subscription = id, filter = ?query.filter, "live query opened");
    Subscription {
        id,
        active,
        abort: handle.abort_handle(),
    }
}

/// Waits for the next write and swallows any that queued up behind it, since
/// one re-read covers all of them. Returns false once the feed is gone.
async fn wait_for_change(changes: &mut broadcast::Receiver<()>) -> bool {
    match changes.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        Err(broadcast::error::RecvError::Closed) => return false,
    }
    loop {
        match changes.try_recv() {
            Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Empty) => return true,
            Err(broadcast::error::TryRecvError::Closed) => return false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Snapshot(Vec<Task>),
    Failed(String),
}

/// Channel form of [`subscribe`]. The receiver ends after a `Failed` event or
/// once the subscription is dropped.
pub fn watch<S>(store: Arc<S>, query: TaskQuery) -> (Subscription, mpsc::UnboundedReceiver<LiveEvent>)
where
    S: TaskStore + ?Sized,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let errors = tx.clone();
    let subscription = subscribe(
        store,
        query,
        move |tasks| {
            let _ = tx.send(LiveEvent::Snapshot(tasks));
        },
        move |err| {
            let _ = errors.send(LiveEvent::Failed(err.to_string()));
        },
    );
    (subscription, rx)
}
