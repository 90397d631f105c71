//! Redis-backed task queue
//!
//! Layout:
//! - `{prefix}:queue` is a list of pending task messages (LPUSH / BRPOP)
//! - `{prefix}:job:{id}` holds the JSON job record, expiring after the
//!   configured result TTL
//!
//! BRPOP runs on a connection of its own. A blocked pop holds a multiplexed
//! connection until it returns, so record reads and writes use another.

use async_trait::async_trait;
use nimbus_core::{
    BatchOutcome, Error, JobId, JobRecord, PredictionRecord, Progress, QueueSettings, Result,
    TaskMessage,
};
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::queue::TaskQueue;

/// Task queue shared between the server and worker processes through Redis
#[derive(Clone)]
pub struct RedisQueue {
    /// Job records and LPUSH
    connection: ConnectionManager,
    /// BRPOP only
    blocking_connection: ConnectionManager,
    key_prefix: String,
    result_ttl_secs: u64,
}

impl RedisQueue {
    /// Connect to the Redis server named in the settings
    pub async fn connect(settings: &QueueSettings) -> Result<Self> {
        let client = redis::Client::open(settings.redis_url.as_str())
            .map_err(|e| Error::config(format!("invalid redis url: {}", e)))?;
        let connection = ConnectionManager::new(client.clone())
            .await
            .map_err(redis_error)?;
        let blocking_connection = ConnectionManager::new(client)
            .await
            .map_err(redis_error)?;

        info!("Connected to Redis queue at {}", settings.redis_url);

        Ok(Self {
            connection,
            blocking_connection,
            key_prefix: settings.key_prefix.clone(),
            result_ttl_secs: settings.result_ttl_secs,
        })
    }

    fn queue_key(&self) -> String {
        queue_key(&self.key_prefix)
    }

    fn job_key(&self, job_id: &JobId) -> String {
        job_key(&self.key_prefix, job_id)
    }

    async fn load_record(&self, job_id: &JobId) -> Result<Option<JobRecord>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.job_key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store_record(&self, record: &JobRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(self.job_key(&record.job_id))
            .arg(payload)
            .arg("EX")
            .arg(self.result_ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    /// Read-modify-write of a job record; a job is owned by one worker at a time
    async fn update(&self, job_id: &JobId, apply: impl FnOnce(&mut JobRecord) + Send) -> Result<()> {
        let mut record = match self.load_record(job_id).await? {
            Some(record) => record,
            None => {
                warn!("Job {} has no stored record, recreating it", job_id);
                JobRecord::pending(job_id.clone())
            }
        };
        apply(&mut record);
        self.store_record(&record).await
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn submit(&self, records: Vec<PredictionRecord>) -> Result<JobId> {
        let job_id = JobId::new();
        self.store_record(&JobRecord::pending(job_id.clone()))
            .await?;

        let message = serde_json::to_string(&TaskMessage::new(job_id.clone(), records))?;
        let mut conn = self.connection.clone();
        redis::cmd("LPUSH")
            .arg(self.queue_key())
            .arg(message)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(redis_error)?;

        debug!("Submitted job {} to {}", job_id, self.queue_key());
        Ok(job_id)
    }

    async fn query(&self, job_id: &JobId) -> Result<JobRecord> {
        Ok(self
            .load_record(job_id)
            .await?
            .unwrap_or_else(|| JobRecord::pending(job_id.clone())))
    }

    async fn next_task(&self, wait: Duration) -> Result<Option<TaskMessage>> {
        let mut conn = self.blocking_connection.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(self.queue_key())
            .arg(blocking_timeout_secs(wait))
            .query_async(&mut conn)
            .await
            .map_err(redis_error)?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn mark_started(&self, job_id: &JobId) -> Result<()> {
        self.update(job_id, |record| record.start()).await
    }

    async fn update_progress(&self, job_id: &JobId, progress: Progress) -> Result<()> {
        self.update(job_id, move |record| record.progress(progress))
            .await
    }

    async fn complete(&self, job_id: &JobId, outcome: BatchOutcome) -> Result<()> {
        self.update(job_id, move |record| record.finish(outcome))
            .await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

fn redis_error(e: redis::RedisError) -> Error {
    Error::queue(e.to_string())
}

fn queue_key(prefix: &str) -> String {
    format!("{}:queue", prefix)
}

fn job_key(prefix: &str, job_id: &JobId) -> String {
    format!("{}:job:{}", prefix, job_id)
}

/// BRPOP takes whole seconds here, and 0 would block forever
fn blocking_timeout_secs(wait: Duration) -> u64 {
    wait.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let job_id = JobId::from("abc-123");
        assert_eq!(queue_key("nimbus"), "nimbus:queue");
        assert_eq!(job_key("nimbus", &job_id), "nimbus:job:abc-123");
        assert_eq!(job_key("staging", &job_id), "staging:job:abc-123");
    }

    #[test]
    fn test_blocking_timeout_never_zero() {
        assert_eq!(blocking_timeout_secs(Duration::ZERO), 1);
        assert_eq!(blocking_timeout_secs(Duration::from_millis(200)), 1);
        assert_eq!(blocking_timeout_secs(Duration::from_secs(5)), 5);
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let settings = QueueSettings {
            redis_url: "not a url".to_string(),
            ..QueueSettings::default()
        };

        match RedisQueue::connect(&settings).await {
            Err(Error::Config(msg)) => assert!(msg.contains("invalid redis url")),
            Err(other) => panic!("expected config error, got {other}"),
            Ok(_) => panic!("expected config error"),
        }
    }
}
