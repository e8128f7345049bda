//! Redis-backed task collection.
//!
//! Each task is a JSON document under `task:{id}`. Every committed write is
//! announced on the `tasks:changed` channel so that all backend instances
//! sharing the database wake their live queries, not only the one that wrote.

use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, Client};
use shared::{NewTask, Task, TaskPatch, TaskQuery};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{StoreError, TaskStore, CHANGE_CHANNEL_CAPACITY};

const KEY_PREFIX: &str = "task:";
const CHANGE_CHANNEL: &str = "tasks:changed";
const RESUBSCRIBE_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

fn task_key(id: Uuid) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// A change message carries the writer's origin id; our own writes were
/// already announced locally.
fn is_foreign_change(payload: &str, origin: &str) -> bool {
    payload != origin
}

/// Decodes an `MGET` reply. Keys deleted between `KEYS` and `MGET` come back
/// as nil and malformed documents are skipped.
fn decode_documents(docs: Vec<Option<String>>) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(docs.len());
    for json in docs.into_iter().flatten() {
        match serde_json::from_str::<Task>(&json) {
            Ok(task) => tasks.push(task),
            Err(err) => tracing::warn!(error = %err, "skipping malformed task document"),
        }
    }
    tasks
}

pub struct RedisStore {
    client: Client,
    origin: String,
    changed: broadcast::Sender<()>,
    listener: JoinHandle<()>,
}

impl RedisStore {
    /// Opens the client and starts listening for writes made by other
    /// instances. Must be called from inside a tokio runtime.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        // Fail fast on a bad address instead of on the first request.
        let mut conn = client.get_async_connection().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;

        let origin = Uuid::new_v4().to_string();
        let (changed, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let listener = tokio::spawn(listen_for_changes(
            client.clone(),
            origin.clone(),
            changed.clone(),
        ));

        tracing::info!(%url, "connected to redis");
        Ok(Self {
            client,
            origin,
            changed,
            listener,
        })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, StoreError> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::Connection,
        id: Uuid,
    ) -> Result<Option<Task>, StoreError> {
        let raw: Option<String> = conn.get(task_key(id)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn save(&self, conn: &mut redis::aio::Connection, task: &Task) -> Result<(), StoreError> {
        let json = serde_json::to_string(task)?;
        conn.set::<_, _, ()>(task_key(task.id), json).await?;
        Ok(())
    }

    /// Wakes local readers right away and tells every other instance.
    async fn announce(&self, conn: &mut redis::aio::Connection) {
        let _ = self.changed.send(());
        if let Err(err) = conn.publish::<_, _, ()>(CHANGE_CHANNEL, &self.origin).await {
            tracing::warn!(error = %err, "failed to publish task change");
        }
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen_for_changes(client: Client, origin: String, changed: broadcast::Sender<()>) {
    loop {
        match subscribe_changes(&client, &origin, &changed).await {
            Ok(()) => tracing::warn!("redis change feed closed, resubscribing"),
            Err(err) => tracing::warn!(error = %err, "redis change feed failed, resubscribing"),
        }
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

async fn subscribe_changes(
    client: &Client,
    origin: &str,
    changed: &broadcast::Sender<()>,
) -> Result<(), StoreError> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    pubsub.subscribe(CHANGE_CHANNEL).await?;
    tracing::debug!(channel = CHANGE_CHANNEL, "listening for task changes");

    let messages = pubsub.on_message();
    futures::pin_mut!(messages);
    while let Some(msg) = messages.next().await {
        let sender: String = msg.get_payload().unwrap_or_default();
        if is_foreign_change(&sender, origin) {
            let _ = changed.send(());
        }
    }
    Ok(())
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn query(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(format!("{KEY_PREFIX}*")).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let docs: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        Ok(query.evaluate(decode_documents(docs)))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let mut conn = self.connection().await?;
        self.load(&mut conn, id).await
    }

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        if task.text.trim().is_empty() {
            return Err(StoreError::Invalid("text must not be empty".into()));
        }
        let task = task.into_task(Uuid::new_v4());

        let mut conn = self.connection().await?;
        self.save(&mut conn, &task).await?;
        tracing::debug!(task_id = %task.id, "task inserted");
        self.announce(&mut conn).await;
        Ok(task)
    }

    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut conn = self.connection().await?;
        let mut task = self
            .load(&mut conn, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        patch
            .apply_to(&mut task)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        self.save(&mut conn, &task).await?;
        tracing::debug!(task_id = %id, "task updated");
        self.announce(&mut conn).await;
        Ok(task)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let deleted: usize = conn.del(task_key(id)).await?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id));
        }
        tracing::debug!(task_id = %id, "task deleted");
        self.announce(&mut conn).await;
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<()> {
        self.changed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn keys_share_the_task_prefix() {
        let id = Uuid::nil();
        assert_eq!(task_key(id), "task:00000000-0000-0000-0000-000000000000");
        assert!(task_key(id).starts_with(KEY_PREFIX));
    }

    #[test]
    fn own_change_messages_are_ignored() {
        let origin = Uuid::new_v4().to_string();
        assert!(!is_foreign_change(&origin, &origin));
        assert!(is_foreign_change(&Uuid::new_v4().to_string(), &origin));
        assert!(is_foreign_change("", &origin));
    }

    #[test]
    fn listing_skips_missing_and_malformed_documents() {
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        let task = NewTask::from_input("water plants", now)
            .unwrap()
            .into_task(Uuid::new_v4());
        let docs = vec![
            None,
            Some("{not json".to_string()),
            Some(serde_json::to_string(&task).unwrap()),
        ];

        assert_eq!(decode_documents(docs), vec![task]);
    }
}
