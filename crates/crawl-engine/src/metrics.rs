//! Observability for the crawl engine.
//!
//! Metrics are recorded through an `EngineMetrics` collaborator (component
//! wiring note in the spec: "global singletons as injected metrics
//! collaborators") rather than called as bare free functions at every call
//! site, so a worker loop never depends on a particular metrics backend
//! being installed to run its tests.
//!
//! - `crawler_pages_crawled_total` / `crawler_pages_failed_total` /
//!   `crawler_crawl_duration_seconds`
//! - `queue_*_length_current`, `queue_fetch_*_total`, `queue_failures_total`
//! - `store_*`, `store_db_*`, `store_cache_*`, `store_bloom_filter_*`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const CRAWLER_PAGES_CRAWLED: &str = "crawler_pages_crawled_total";
    pub const CRAWLER_PAGES_FAILED: &str = "crawler_pages_failed_total";
    pub const CRAWLER_CRAWL_DURATION: &str = "crawler_crawl_duration_seconds";

    pub const QUEUE_HIGH_LENGTH: &str = "queue_high_priority_length_current";
    pub const QUEUE_MEDIUM_LENGTH: &str = "queue_medium_priority_length_current";
    pub const QUEUE_STORE_LENGTH: &str = "queue_store_queue_length_current";
    pub const QUEUE_RETRY_LENGTH: &str = "queue_retry_priority_length_current";
    pub const QUEUE_FETCH_HIGH: &str = "queue_fetch_high_priority_total";
    pub const QUEUE_FETCH_MEDIUM: &str = "queue_fetch_medium_priority_total";
    pub const QUEUE_FETCH_STORE: &str = "queue_fetch_store_queue_total";
    pub const QUEUE_FAILURES: &str = "queue_failures_total";

    pub const STORE_REQUESTS: &str = "store_requests_total";
    pub const STORE_FAILURES: &str = "store_failures_total";
    pub const STORE_LATENCY: &str = "store_latency_seconds";

    pub const STORE_DB_WRITES: &str = "store_db_writes_total";
    pub const STORE_DB_WRITE_ERRORS: &str = "store_db_write_errors_total";
    pub const STORE_DB_WRITE_LATENCY: &str = "store_db_write_latency_seconds";

    pub const STORE_CACHE_VALUES: &str = "store_cache_values_current";
    pub const STORE_CACHE_REQUESTS: &str = "store_cache_requests_total";
    pub const STORE_CACHE_FAILURES: &str = "store_cache_failures_total";
    pub const STORE_CACHE_SET_LATENCY: &str = "store_cache_set_latency_seconds";
    pub const STORE_CACHE_FETCH_LATENCY: &str = "store_cache_fetch_latency_seconds";

    pub const BLOOM_REQUESTS: &str = "store_bloom_filter_requests_total";
    pub const BLOOM_VALUES_ADDED: &str = "store_bloom_filter_values_added_total";
    pub const BLOOM_FAILURES: &str = "store_bloom_filter_failures_total";
    pub const BLOOM_POSITIVE: &str = "store_bloom_filter_positive_responses_total";
    pub const BLOOM_NEGATIVE: &str = "store_bloom_filter_negative_responses_total";
}

/// The queue a metric observation pertains to, mirroring the four named
/// queues (component B) rather than accepting an open string label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    High,
    Medium,
    Store,
    Retry,
}

impl QueueName {
    fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Store => "store",
            Self::Retry => "retry",
        }
    }
}

/// Metrics collaborator invoked by the worker loop, buffer, and politeness
/// gate. A production binary wires `PrometheusEngineMetrics`; tests wire
/// `NoopEngineMetrics`.
pub trait EngineMetrics: Send + Sync {
    fn observe_add(&self, queue: QueueName);
    fn observe_fetch(&self, queue: QueueName);
    fn update(&self, queue: QueueName, failed: bool, duration: Duration);
    fn set_queue_length(&self, queue: QueueName, length: i64);
    fn record_bloom_check(&self, positive: bool);
    fn record_bloom_add(&self);
    fn record_cache_request(&self, failed: bool, duration: Duration);
    fn record_db_write(&self, failed: bool, duration: Duration);
}

pub struct PrometheusEngineMetrics;

impl PrometheusEngineMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PrometheusEngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics for PrometheusEngineMetrics {
    fn observe_add(&self, queue: QueueName) {
        let metric = match queue {
            QueueName::High => names::QUEUE_FETCH_HIGH,
            QueueName::Medium => names::QUEUE_FETCH_MEDIUM,
            QueueName::Store => names::QUEUE_FETCH_STORE,
            QueueName::Retry => names::QUEUE_FETCH_HIGH, // retry re-enters via high-priority semantics
        };
        counter!(metric, "queue" => queue.as_str()).increment(1);
    }

    fn observe_fetch(&self, queue: QueueName) {
        counter!(names::CRAWLER_PAGES_CRAWLED, "queue" => queue.as_str()).increment(1);
    }

    fn update(&self, queue: QueueName, failed: bool, duration: Duration) {
        if failed {
            counter!(names::CRAWLER_PAGES_FAILED, "queue" => queue.as_str()).increment(1);
            counter!(names::QUEUE_FAILURES, "queue" => queue.as_str()).increment(1);
        }
        histogram!(names::CRAWLER_CRAWL_DURATION, "queue" => queue.as_str())
            .record(duration.as_secs_f64());
    }

    fn set_queue_length(&self, queue: QueueName, length: i64) {
        let metric = match queue {
            QueueName::High => names::QUEUE_HIGH_LENGTH,
            QueueName::Medium => names::QUEUE_MEDIUM_LENGTH,
            QueueName::Store => names::QUEUE_STORE_LENGTH,
            QueueName::Retry => names::QUEUE_RETRY_LENGTH,
        };
        gauge!(metric).set(length as f64);
    }

    fn record_bloom_check(&self, positive: bool) {
        counter!(names::BLOOM_REQUESTS).increment(1);
        if positive {
            counter!(names::BLOOM_POSITIVE).increment(1);
        } else {
            counter!(names::BLOOM_NEGATIVE).increment(1);
        }
    }

    fn record_bloom_add(&self) {
        counter!(names::BLOOM_VALUES_ADDED).increment(1);
    }

    fn record_cache_request(&self, failed: bool, duration: Duration) {
        counter!(names::STORE_CACHE_REQUESTS).increment(1);
        if failed {
            counter!(names::STORE_CACHE_FAILURES).increment(1);
        }
        histogram!(names::STORE_CACHE_FETCH_LATENCY).record(duration.as_secs_f64());
    }

    fn record_db_write(&self, failed: bool, duration: Duration) {
        counter!(names::STORE_DB_WRITES).increment(1);
        if failed {
            counter!(names::STORE_DB_WRITE_ERRORS).increment(1);
        }
        histogram!(names::STORE_DB_WRITE_LATENCY).record(duration.as_secs_f64());
    }
}

/// No-op implementation for unit tests that don't care about observability.
#[derive(Default)]
pub struct NoopEngineMetrics;

impl EngineMetrics for NoopEngineMetrics {
    fn observe_add(&self, _queue: QueueName) {}
    fn observe_fetch(&self, _queue: QueueName) {}
    fn update(&self, _queue: QueueName, _failed: bool, _duration: Duration) {}
    fn set_queue_length(&self, _queue: QueueName, _length: i64) {}
    fn record_bloom_check(&self, _positive: bool) {}
    fn record_bloom_add(&self) {}
    fn record_cache_request(&self, _failed: bool, _duration: Duration) {}
    fn record_db_write(&self, _failed: bool, _duration: Duration) {}
}

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

/// Fetch the already-installed handle, if any, for rendering `/metrics`.
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_labels() {
        assert_eq!(QueueName::High.as_str(), "high");
        assert_eq!(QueueName::Retry.as_str(), "retry");
    }

    #[test]
    fn noop_metrics_never_panics() {
        let m = NoopEngineMetrics;
        m.observe_add(QueueName::High);
        m.update(QueueName::Store, true, Duration::from_millis(5));
        m.record_bloom_check(true);
    }

}
