//! Redis connection bootstrap, grounded in the teacher's
//! `database::redis::connector` idiom (`Client::open` -> `ConnectionManager`
//! -> `PING` verification) with the same retry-with-backoff wrapper, hand
//! rolled here since this workspace has no `database` crate of its own.

use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Mirrors the teacher's `RetryConfig` defaults: 3 retries, 100ms initial
/// delay, 5s cap, doubling backoff.
struct RetryConfig {
    max_retries: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    info!(%url, "connecting to redis");
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    info!("redis connection established");
    Ok(manager)
}

/// Connects with exponential backoff, no jitter (deterministic startup
/// timing is easier to reason about than the teacher's jittered variant).
pub async fn connect_with_retry(url: &str) -> redis::RedisResult<ConnectionManager> {
    let config = RetryConfig::default();
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        match connect(url).await {
            Ok(manager) => return Ok(manager),
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    warn!(error = %e, attempts = attempt, "redis connection failed permanently");
                    return Err(e);
                }
                warn!(error = %e, attempt, max_retries = config.max_retries, delay_ms = delay, "redis connection attempt failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(config.max_delay_ms);
            }
        }
    }
}
