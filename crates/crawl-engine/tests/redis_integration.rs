//! Integration tests against a real Redis via `testcontainers`, following
//! the same `ContainerAsync`-backed helper pattern as the teacher's own
//! `test_utils::TestRedis` (§14 test tooling). Unit tests elsewhere in this
//! crate exercise the same contracts against in-memory fakes; these tests
//! confirm the Lua scripts and stream/sorted-set commands actually do what
//! the fakes assume against a live server.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

use crawl_engine::collaborators::{RobotsGroup, RobotsParser};
use crawl_engine::error::EngineError;
use crawl_engine::{source, Broker, HostLookup, PolitenessGate, RetryScheduler, Task, Topic};

/// Unwraps a `get_rules` call to the `Found` case, panicking with a
/// message naming the host if the record is unexpectedly `Missing` — every
/// test below calls this only after `save_rules` for that host.
fn expect_found(lookup: HostLookup, host: &str) -> crawl_engine::RateLimitResult {
    match lookup {
        HostLookup::Found(result) => result,
        HostLookup::Missing => panic!("expected a politeness record for {host}, found none"),
    }
}

/// Self-contained Redis container wrapper, torn down on drop.
struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    redis: Arc<ConnectionManager>,
}

impl TestRedis {
    async fn new() -> Self {
        let image = Redis::default().with_tag("8-alpine");
        let container = image.start().await.expect("failed to start redis container");
        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("failed to get redis port");

        let client = Client::open(format!("redis://127.0.0.1:{port}")).expect("invalid redis url");
        let manager = ConnectionManager::new(client)
            .await
            .expect("failed to build connection manager");

        Self {
            container,
            redis: Arc::new(manager),
        }
    }
}

/// Always allows, matching the narrow seam the politeness gate actually
/// calls through — these tests exercise the token bucket, not robots
/// group-matching (covered separately in `crawl-worker`'s `robots.rs`).
struct AllowAllRobots;

impl RobotsParser for AllowAllRobots {
    fn parse(&self, _raw: &str) -> Result<RobotsGroup, EngineError> {
        Ok(RobotsGroup {
            crawl_delay_ms: Some(1000),
        })
    }

    fn is_allowed(&self, _raw: &str, _path: &str) -> bool {
        true
    }
}

#[tokio::test]
async fn broker_add_get_ack_round_trip_against_real_redis() {
    let redis = TestRedis::new().await;
    let broker = Broker::new(redis.redis.clone(), "test-consumer");
    broker.ensure_consumer_group(source::HIGH).await.unwrap();

    let task = Task::new("unused", Topic::FetchRules, "https://example.com/seed", source::HIGH, "");
    broker.add(source::HIGH, &task).await;

    let deliveries = broker.get(source::HIGH, 10).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].task.url, "https://example.com/seed");
    assert!(deliveries[0].stream_id.is_some());

    let ids: Vec<String> = deliveries
        .iter()
        .map(|d| d.stream_id.clone().unwrap())
        .collect();
    broker.ack(source::HIGH, &ids).await;

    assert!(broker.is_empty(source::HIGH).await.unwrap());
}

#[tokio::test]
async fn broker_get_on_empty_stream_yields_no_tasks() {
    let redis = TestRedis::new().await;
    let broker = Broker::new(redis.redis.clone(), "test-consumer");
    broker.ensure_consumer_group(source::MEDIUM).await.unwrap();

    let result = broker.get(source::MEDIUM, 5).await;
    assert!(matches!(result, Err(EngineError::NoTasks)));
}

#[tokio::test]
async fn retry_scheduler_holds_back_tasks_not_yet_due() {
    let redis = TestRedis::new().await;
    let scheduler = RetryScheduler::new(redis.redis.clone(), "test:retry");

    let task = Task::new("1", Topic::CrawlPage, "https://example.com/a", "queue:fetch:retry", "");
    scheduler.retry(task).await.unwrap();

    // next_attempt_at is now() + 2s: not due yet, must be re-inserted
    // rather than returned.
    let result = scheduler.get(10).await;
    assert!(matches!(result, Err(EngineError::NoTasks)));
    assert_eq!(scheduler.len().await.unwrap(), 1);
}

#[tokio::test]
async fn retry_scheduler_returns_tasks_once_due() {
    let redis = TestRedis::new().await;
    let scheduler = RetryScheduler::new(redis.redis.clone(), "test:retry:due");

    // A task already at MAX_RETRIES - 1 backs off by 2s on its next retry;
    // instead we manufacture due-now by retrying a fresh task and waiting
    // out its 2s first backoff.
    let task = Task::new("2", Topic::CrawlPage, "https://example.com/b", "queue:fetch:retry", "");
    scheduler.retry(task).await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let due = scheduler.get(10).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].url, "https://example.com/b");
    assert_eq!(due[0].retries, 1);
    assert_eq!(scheduler.len().await.unwrap(), 0);
}

#[tokio::test]
async fn retry_scheduler_drops_tasks_past_max_retries() {
    let redis = TestRedis::new().await;
    let scheduler = RetryScheduler::new(redis.redis.clone(), "test:retry:cap");

    let mut task = Task::new("3", Topic::CrawlPage, "https://example.com/c", "queue:fetch:retry", "");
    task.retries = crawl_engine::MAX_RETRIES - 1;
    scheduler.retry(task).await.unwrap();

    assert_eq!(scheduler.len().await.unwrap(), 0);
}

#[tokio::test]
async fn politeness_gate_denies_a_freshly_saved_host_until_its_cap_grows() {
    let redis = TestRedis::new().await;
    let gate = PolitenessGate::new(redis.redis.clone(), Arc::new(AllowAllRobots));

    gate.save_rules("example.com", "User-agent: *\nCrawl-delay: 1\n")
        .await
        .unwrap();

    // save_rules resets max_tokens_num=0: no token is available, no matter
    // how much time elapses, until an adaptive update raises the cap
    // (§4.5: "Zero tokens with a past refill clock").
    let first = expect_found(gate.get_rules("example.com").await.unwrap(), "example.com");
    assert!(!first.allowed, "a freshly saved host has nothing to refill into");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let still_denied = expect_found(gate.get_rules("example.com").await.unwrap(), "example.com");
    assert!(!still_denied.allowed, "elapsed time alone cannot raise a zero cap");
}

#[tokio::test]
async fn politeness_gate_reports_an_unseen_host_as_missing() {
    let redis = TestRedis::new().await;
    let gate = PolitenessGate::new(redis.redis.clone(), Arc::new(AllowAllRobots));

    let lookup = gate.get_rules("never-seen.example.com").await.unwrap();
    assert!(matches!(lookup, HostLookup::Missing));
}

#[tokio::test]
async fn politeness_gate_reports_a_saved_host_with_empty_rules_as_found_not_missing() {
    let redis = TestRedis::new().await;
    let gate = PolitenessGate::new(redis.redis.clone(), Arc::new(AllowAllRobots));

    // Mirrors the fetch_rules hard-failure path: empty rules means
    // unrestricted, not "no record" — the lookup must still report Found.
    gate.save_rules("unrestricted.example.com", "").await.unwrap();

    let lookup = gate.get_rules("unrestricted.example.com").await.unwrap();
    let result = expect_found(lookup, "unrestricted.example.com");
    assert!(result.rules.is_empty());
}

#[tokio::test]
async fn politeness_gate_allows_once_per_delay_after_the_cap_grows() {
    let redis = TestRedis::new().await;
    let gate = PolitenessGate::new(redis.redis.clone(), Arc::new(AllowAllRobots));

    gate.save_rules("slow.example.com", "User-agent: *\nCrawl-delay: 1\n")
        .await
        .unwrap();
    gate.update_host_limit("slow.example.com").await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(
        expect_found(gate.get_rules("slow.example.com").await.unwrap(), "slow.example.com").allowed,
        "after the cap grows to 1 and a full delay elapses, one token must be available"
    );
    assert!(
        !expect_found(gate.get_rules("slow.example.com").await.unwrap(), "slow.example.com").allowed,
        "the single available token must not be reusable immediately"
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(
        expect_found(gate.get_rules("slow.example.com").await.unwrap(), "slow.example.com").allowed,
        "a further full delay later, one more token must have refilled"
    );
}

#[tokio::test]
async fn politeness_gate_update_host_limit_is_a_black_box_nudge() {
    let redis = TestRedis::new().await;
    let gate = PolitenessGate::new(redis.redis.clone(), Arc::new(AllowAllRobots));

    gate.save_rules("nudge.example.com", "User-agent: *\n")
        .await
        .unwrap();
    gate.update_host_limit("nudge.example.com").await.unwrap();
    gate.update_host_limit("nudge.example.com").await.unwrap();
}
