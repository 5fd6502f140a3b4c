//! Worker-pool construction (§5): one Tokio task per configured
//! {high, medium, store, retry} worker, each owning its own `Source`
//! selector and `Buffer` while sharing the pool-wide single-flight guard,
//! Politeness Gate, sidecars, and collaborators — exactly the "private
//! selector, shared fill-guard" split the spec draws between per-worker
//! and pool-wide state.

use std::sync::Arc;
use tokio::sync::watch;

use crawl_config::engine::EngineConfig;
use crawl_engine::collaborators::BloomFilter;
use crawl_engine::{
    source, BlobStore, Broker, Buffer, EngineError, EngineMetrics, FillGuard, HttpCollaborator,
    LinkExtractor, MetadataStore, PolitenessGate, QueueName, Sidecars, Source, Worker,
};
use redis::aio::ConnectionManager;

/// Every out-of-scope collaborator the pool wires into each worker.
pub struct Collaborators {
    pub http: Arc<dyn HttpCollaborator>,
    pub link_extractor: Arc<dyn LinkExtractor>,
    pub blob_store: Arc<dyn BlobStore>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub url_filter: Arc<dyn BloomFilter>,
    pub hash_filter: Arc<dyn BloomFilter>,
    pub politeness: Arc<PolitenessGate>,
    pub metrics: Arc<dyn EngineMetrics>,
}

struct QueueGroup {
    initial: &'static str,
    worker_count: usize,
    queue_name: QueueName,
}

fn queue_groups(config: &EngineConfig) -> Vec<QueueGroup> {
    vec![
        QueueGroup {
            initial: source::HIGH,
            worker_count: config.high_workers,
            queue_name: QueueName::High,
        },
        QueueGroup {
            initial: source::MEDIUM,
            worker_count: config.medium_workers,
            queue_name: QueueName::Medium,
        },
        QueueGroup {
            initial: source::STORE,
            worker_count: config.store_workers,
            queue_name: QueueName::Store,
        },
        QueueGroup {
            initial: source::RETRY,
            worker_count: config.retry_workers,
            queue_name: QueueName::Retry,
        },
    ]
}

/// Wires every worker task in the pool, spawns them, and returns the
/// sidecar submission handles (the seed-file loader submits onto the same
/// handles, §6).
pub async fn spawn_pool(
    redis: Arc<ConnectionManager>,
    config: &EngineConfig,
    collaborators: Collaborators,
    shutdown: watch::Receiver<bool>,
) -> Result<Sidecars, EngineError> {
    let setup_broker = Broker::new(redis.clone(), "setup");
    for stream in [source::HIGH, source::MEDIUM, source::STORE] {
        setup_broker.ensure_consumer_group(stream).await?;
    }

    let fill_guard = FillGuard::new();

    let sidecar_broker = Arc::new(Broker::new(redis.clone(), "sidecars"));
    let sidecars = Sidecars::spawn(
        sidecar_broker,
        collaborators.url_filter.clone(),
        collaborators.metrics.clone(),
        shutdown.clone(),
    );

    for group in queue_groups(config) {
        for index in 0..group.worker_count {
            let consumer_id = format!("{}-{index}", group.initial);
            let broker = Arc::new(Broker::new(redis.clone(), consumer_id));
            let selector = Arc::new(Source::new(group.initial));
            let buffer = Arc::new(Buffer::new(
                group.worker_count,
                config.buffer_capacity_multiplier,
                broker,
                selector,
                fill_guard.clone(),
            ));

            let worker = Arc::new(Worker {
                buffer,
                politeness: collaborators.politeness.clone(),
                http: collaborators.http.clone(),
                url_filter: collaborators.url_filter.clone(),
                hash_filter: collaborators.hash_filter.clone(),
                blob_store: collaborators.blob_store.clone(),
                metadata_store: collaborators.metadata_store.clone(),
                link_extractor: collaborators.link_extractor.clone(),
                sidecars: sidecars.clone(),
                metrics: collaborators.metrics.clone(),
                queue_name: group.queue_name,
            });

            tokio::spawn(worker.run(shutdown.clone()));
        }
    }

    Ok(sidecars)
}
