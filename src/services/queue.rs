use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::SheetFormat;

const QUEUE_KEY: &str = "courier_rates:imports";
const PROCESSING_KEY: &str = "courier_rates:imports:processing";

/// Import payload serialized into Redis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedImport {
    pub job_id: Uuid,
    pub courier_id: i64,
    pub format: SheetFormat,
    pub file_key: String,
}

/// Redis list queue. Dequeued payloads stay in a processing list until
/// `complete` removes them, so a crashed worker's import can be recovered.
pub struct ImportQueue {
    client: redis::Client,
}

impl ImportQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn enqueue(&self, import: &QueuedImport) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(import)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    /// Pop the oldest import, moving it to the processing list.
    pub async fn dequeue(&self) -> Result<Option<QueuedImport>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn.rpoplpush(QUEUE_KEY, PROCESSING_KEY).await?;

        match result {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Remove a finished import from the processing list.
    pub async fn complete(&self, import: &QueuedImport) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(import)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload).await?;
        Ok(())
    }

    /// Move everything left in the processing list back onto the queue.
    /// Run at worker startup, before any import is dequeued.
    pub async fn requeue_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        // Bounded by the current length; other workers keep dequeuing meanwhile
        let in_flight: usize = conn.llen(PROCESSING_KEY).await?;
        let mut moved = 0;
        for _ in 0..in_flight {
            let payload: Option<String> = conn.rpoplpush(PROCESSING_KEY, QUEUE_KEY).await?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Imports waiting for a worker.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        Ok(conn.llen(QUEUE_KEY).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
