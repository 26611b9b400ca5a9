// [[PAWS]]/apps/inference-server/src/store.rs
// Purpose: Persistence of prediction rows. Redis when configured, in-process otherwise.
// Architecture: Infrastructure Layer
// Dependencies: redis, dashmap, serde_json

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::models::{FeedbackType, NewPrediction, PredictionRecord};

pub const NEXT_ID_KEY: &str = "predictions:next_id";
pub const INDEX_KEY: &str = "predictions:index";

pub fn record_key(id: u64) -> String {
    format!("prediction:{}", id)
}

/// Row and index entry in one MULTI/EXEC block: both land or neither does.
fn insert_pipeline(id: u64, json: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .set(record_key(id), json)
        .ignore()
        .rpush(INDEX_KEY, id)
        .ignore();
    pipe
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt record: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Persists a new row and returns it with its assigned id.
    async fn insert(&self, new: NewPrediction) -> Result<PredictionRecord, StoreError>;

    /// Attaches user feedback to a row. `Ok(false)` when the id is unknown.
    async fn record_feedback(&self, id: u64, feedback: FeedbackType) -> Result<bool, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Most recently inserted row.
    async fn latest(&self) -> Result<Option<PredictionRecord>, StoreError>;

    /// Cheap liveness check used by the health endpoint.
    async fn ping(&self) -> bool;

    fn backend(&self) -> &'static str;
}

pub struct RedisPredictionStore {
    client: redis::Client,
}

impl RedisPredictionStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        Ok(RedisPredictionStore { client })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, StoreError> {
        Ok(self.client.get_async_connection().await?)
    }
}

#[async_trait]
impl PredictionStore for RedisPredictionStore {
    async fn insert(&self, new: NewPrediction) -> Result<PredictionRecord, StoreError> {
        let mut con = self.connection().await?;

        let id: u64 = con.incr(NEXT_ID_KEY, 1).await?;
        let record = PredictionRecord::from_new(id, new);
        let json = serde_json::to_string(&record)?;

        insert_pipeline(id, &json)
            .query_async::<_, ()>(&mut con)
            .await?;

        tracing::debug!("Stored prediction {} in Redis", id);
        Ok(record)
    }

    async fn record_feedback(&self, id: u64, feedback: FeedbackType) -> Result<bool, StoreError> {
        let mut con = self.connection().await?;
        let key = record_key(id);

        let data: Option<String> = con.get(&key).await?;
        let Some(data) = data else {
            return Ok(false);
        };

        let mut record: PredictionRecord = serde_json::from_str(&data)?;
        record.user_feedback = Some(feedback);
        con.set::<_, _, ()>(&key, serde_json::to_string(&record)?).await?;
        Ok(true)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut con = self.connection().await?;
        Ok(con.llen(INDEX_KEY).await?)
    }

    async fn latest(&self) -> Result<Option<PredictionRecord>, StoreError> {
        let mut con = self.connection().await?;

        let id: Option<u64> = con.lindex(INDEX_KEY, -1).await?;
        let Some(id) = id else {
            return Ok(None);
        };

        let data: Option<String> = con.get(record_key(id)).await?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => {
                tracing::warn!("Index references missing prediction row {}", id);
                Ok(None)
            }
        }
    }

    async fn ping(&self) -> bool {
        let mut con = match self.connection().await {
            Ok(con) => con,
            Err(e) => {
                tracing::warn!("Redis connection failed during health check: {}", e);
                return false;
            }
        };
        redis::cmd("PING")
            .query_async::<_, String>(&mut con)
            .await
            .is_ok()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Process-local store used when no Redis is configured. Not durable, and
/// rows are never evicted.
#[derive(Default)]
pub struct MemoryPredictionStore {
    rows: DashMap<u64, PredictionRecord>,
    next_id: AtomicU64,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionStore for MemoryPredictionStore {
    async fn insert(&self, new: NewPrediction) -> Result<PredictionRecord, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = PredictionRecord::from_new(id, new);
        self.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn record_feedback(&self, id: u64, feedback: FeedbackType) -> Result<bool, StoreError> {
        match self.rows.get_mut(&id) {
            Some(mut row) => {
                row.user_feedback = Some(feedback);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.rows.len() as u64)
    }

    async fn latest(&self) -> Result<Option<PredictionRecord>, StoreError> {
        let newest = self.next_id.load(Ordering::SeqCst);
        Ok(self.rows.get(&newest).map(|row| row.value().clone()))
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
