//! The task collection.
//!
//! A [`TaskStore`] is the single source of truth for tasks. Readers evaluate a
//! [`TaskQuery`] against it and listen on [`TaskStore::changes`] to learn when
//! to evaluate again; writers never report back anything but success or
//! failure.

use async_trait::async_trait;
use shared::{NewTask, Task, TaskPatch, TaskQuery};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Capacity of the change fan-out. Readers only need to know that something
/// changed, so a lagging receiver simply re-reads.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(Uuid),

    #[error("invalid task: {0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("malformed task document: {0}")]
    Codec(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Evaluates `query` against a consistent read of the collection.
    async fn query(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError>;

    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Fires once per committed write.
    fn changes(&self) -> broadcast::Receiver<()>;
}
