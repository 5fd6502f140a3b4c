//! Retry scheduler (component F): a Redis sorted set keyed by
//! `next_attempt_at`, with pop-if-due semantics. Unlike a plain requeue,
//! a popped-but-not-yet-due entry is always reinserted rather than
//! returned or dropped (§8 invariant 7).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

use crate::error::EngineError;
use crate::task::{now_unix, Task, MAX_RETRIES};

pub struct RetryScheduler {
    redis: Arc<ConnectionManager>,
    key: String,
}

impl RetryScheduler {
    pub fn new(redis: Arc<ConnectionManager>, key: impl Into<String>) -> Self {
        Self {
            redis,
            key: key.into(),
        }
    }

    /// `Retry(task)` (§4.6): bumps `retries`, recomputes `next_attempt_at`
    /// via the deterministic backoff formula, and inserts the full
    /// JSON-encoded task scored by its due time. Tasks that would reach
    /// `MAX_RETRIES` are dropped silently rather than rescheduled.
    pub async fn retry(&self, mut task: Task) -> Result<(), EngineError> {
        task.retries += 1;
        if task.retries >= MAX_RETRIES {
            return Ok(());
        }
        task.source = "retry".to_string();
        task.next_attempt_at = now_unix() + Task::next_backoff_secs(task.retries);

        let encoded = task.encode_full()?;
        let mut conn = (*self.redis).clone();
        let _: () = conn
            .zadd(&self.key, encoded, task.next_attempt_at)
            .await
            .map_err(EngineError::Redis)?;
        Ok(())
    }

    /// `Get(retry, count)` (§4.6): pops the `count` smallest-score members;
    /// anything not yet due is reinserted immediately. Returns
    /// `EngineError::NoTasks` if nothing in the set is due.
    pub async fn get(&self, count: isize) -> Result<Vec<Task>, EngineError> {
        let mut conn = (*self.redis).clone();
        let members: Vec<(String, f64)> = conn
            .zpopmin(&self.key, count)
            .await
            .map_err(EngineError::Redis)?;

        if members.is_empty() {
            return Err(EngineError::NoTasks);
        }

        let now = now_unix();
        let mut due = Vec::with_capacity(members.len());
        for (data, score) in members {
            if (score as i64) > now {
                // Not due yet: reinsert rather than return or drop.
                let _: () = conn
                    .zadd(&self.key, &data, score)
                    .await
                    .map_err(EngineError::Redis)?;
                continue;
            }
            if let Ok(task) = Task::decode_full(&data) {
                due.push(task);
            }
        }

        if due.is_empty() {
            return Err(EngineError::NoTasks);
        }
        Ok(due)
    }

    pub async fn len(&self) -> Result<i64, EngineError> {
        let mut conn = (*self.redis).clone();
        conn.zcard(&self.key).await.map_err(EngineError::Redis)
    }

    /// Admin surface: list retry-set entries ordered by due time.
    pub async fn list(&self, limit: isize) -> Result<Vec<Task>, EngineError> {
        let mut conn = (*self.redis).clone();
        let members: Vec<String> = conn
            .zrange(&self.key, 0, limit - 1)
            .await
            .map_err(EngineError::Redis)?;
        Ok(members.iter().filter_map(|m| Task::decode_full(m).ok()).collect())
    }

    /// Admin surface: remove a single entry by task id. Entries are
    /// content-addressed (the sorted set member is the task's own encoded
    /// JSON), so this scans the full set looking for a matching id and
    /// removes the exact matching member; returns whether anything was
    /// removed.
    pub async fn remove(&self, task_id: &str) -> Result<bool, EngineError> {
        let mut conn = (*self.redis).clone();
        let members: Vec<String> = conn.zrange(&self.key, 0, -1).await.map_err(EngineError::Redis)?;
        for member in members {
            if let Ok(task) = Task::decode_full(&member) {
                if task.id == task_id {
                    let removed: i64 = conn.zrem(&self.key, &member).await.map_err(EngineError::Redis)?;
                    return Ok(removed > 0);
                }
            }
        }
        Ok(false)
    }

    /// Admin surface: drop every entry from the retry set.
    pub async fn purge(&self) -> Result<i64, EngineError> {
        let mut conn = (*self.redis).clone();
        let len: i64 = conn.zcard(&self.key).await.map_err(EngineError::Redis)?;
        if len > 0 {
            let _: () = conn.del(&self.key).await.map_err(EngineError::Redis)?;
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Topic;

    #[test]
    fn retry_monotonicity_holds_for_consecutive_attempts() {
        let first = Task::next_backoff_secs(1);
        let second = Task::next_backoff_secs(2);
        assert!(second >= first * 2, "second delay must be >= 2x first");
    }

    #[test]
    fn task_retries_at_cap_are_identified_for_silent_drop() {
        let mut task = Task::new("1", Topic::CrawlPage, "https://x", "queue:fetch:retry", "");
        task.retries = MAX_RETRIES - 1;
        task.retries += 1;
        assert!(task.retries >= MAX_RETRIES);
    }
}
