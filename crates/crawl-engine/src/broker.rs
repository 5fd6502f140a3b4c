//! Broker queue (component B): Redis Streams + consumer groups for the
//! three live queues, delegating retry-queue reads to the retry scheduler
//! (component F, §4.1) rather than treating `queue:fetch:retry` as a plain
//! stream.

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::retry::RetryScheduler;
use crate::source::{self};
use crate::task::Task;

pub const CONSUMER_GROUP: &str = "workers";
const BLOCK_MS: usize = 100;
const ADD_TIMEOUT: Duration = Duration::from_secs(3);

/// A task delivery handed to the worker loop, carrying the stream entry id
/// needed to ack it later (empty for retry-sourced tasks, which have no
/// stream delivery to ack).
pub struct Delivery {
    pub task: Task,
    pub stream_id: Option<String>,
    pub queue: String,
}

pub struct Broker {
    redis: Arc<ConnectionManager>,
    consumer_id: String,
    retry: RetryScheduler,
}

impl Broker {
    pub fn new(redis: Arc<ConnectionManager>, consumer_id: impl Into<String>) -> Self {
        let retry = RetryScheduler::new(redis.clone(), source::RETRY);
        Self {
            redis,
            consumer_id: consumer_id.into(),
            retry,
        }
    }

    pub fn retry_scheduler(&self) -> &RetryScheduler {
        &self.retry
    }

    pub async fn ensure_consumer_group(&self, stream: &str) -> Result<(), EngineError> {
        let mut conn = (*self.redis).clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(CONSUMER_GROUP)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(EngineError::Redis(e)),
        }
    }

    /// `Add` (§4.1): validates the task, drops it silently if invalid,
    /// best-effort (errors are logged, not propagated).
    pub async fn add(&self, stream: &str, task: &Task) {
        let fields = match task.encode() {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, task_id = %task.id, "dropping invalid task on add");
                return;
            }
        };

        let mut conn = (*self.redis).clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (k, v) in &fields {
            cmd.arg(k).arg(v);
        }

        let result = tokio::time::timeout(ADD_TIMEOUT, cmd.query_async::<String>(&mut conn)).await;
        match result {
            Ok(Ok(_id)) => {}
            Ok(Err(e)) => warn!(error = %e, stream = %stream, "broker add failed"),
            Err(_) => warn!(stream = %stream, "broker add timed out"),
        }
    }

    /// `Get` (§4.1): reads up to `count` new messages from `stream` via
    /// the consumer group, blocking up to 100ms. Reading from the retry
    /// queue name instead delegates to the retry scheduler.
    pub async fn get(&self, stream: &str, count: usize) -> Result<Vec<Delivery>, EngineError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if stream == source::RETRY {
            let tasks = self.retry.get(count as isize).await?;
            return Ok(tasks
                .into_iter()
                .map(|task| Delivery {
                    task,
                    stream_id: None,
                    queue: source::RETRY.to_string(),
                })
                .collect());
        }

        let mut conn = (*self.redis).clone();
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.consumer_id)
            .count(count)
            .block(BLOCK_MS);

        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(EngineError::Redis)?;

        let mut deliveries = Vec::new();
        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let fields: HashMap<String, String> = entry
                    .map
                    .iter()
                    .filter_map(|(k, v)| match v {
                        redis::Value::BulkString(bytes) => {
                            Some((k.clone(), String::from_utf8_lossy(bytes).to_string()))
                        }
                        redis::Value::SimpleString(s) => Some((k.clone(), s.clone())),
                        _ => None,
                    })
                    .collect();

                match Task::decode(entry.id.clone(), &fields, stream) {
                    Ok(task) => deliveries.push(Delivery {
                        task,
                        stream_id: Some(entry.id.clone()),
                        queue: stream.to_string(),
                    }),
                    Err(e) => {
                        debug!(error = %e, id = %entry.id, "dropping malformed stream entry, acking to avoid reprocessing");
                        let _: Result<i64, _> =
                            conn.xack(stream, CONSUMER_GROUP, &[entry.id.clone()]).await;
                    }
                }
            }
        }

        if deliveries.is_empty() {
            return Err(EngineError::NoTasks);
        }
        Ok(deliveries)
    }

    /// `Ack` (§4.1): pipelined, best-effort, failures logged not
    /// propagated.
    pub async fn ack(&self, stream: &str, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let mut conn = (*self.redis).clone();
        let result: redis::RedisResult<i64> = conn.xack(stream, CONSUMER_GROUP, ids).await;
        if let Err(e) = result {
            warn!(error = %e, stream = %stream, "broker ack failed");
        }
    }

    /// `Retry(task)` delegates straight to the retry scheduler.
    pub async fn retry(&self, task: Task) -> Result<(), EngineError> {
        self.retry.retry(task).await
    }

    pub async fn is_empty(&self, stream: &str) -> Result<bool, EngineError> {
        let mut conn = (*self.redis).clone();
        let len: i64 = conn.xlen(stream).await.unwrap_or(0);
        Ok(len == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_queue_name_routes_to_the_scheduler_not_a_stream() {
        assert_eq!(source::RETRY, "queue:fetch:retry");
    }
}
