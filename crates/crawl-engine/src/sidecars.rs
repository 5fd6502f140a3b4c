//! Batching sidecars (component H): three loops coalescing many individual
//! add/delete/retry operations into fewer underlying Redis calls (§4.7).
//! Channel capacities and flush cadences are fixed by the spec, not
//! configurable.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};

use crate::broker::Broker;
use crate::collaborators::BloomFilter;
use crate::metrics::{EngineMetrics, QueueName};
use crate::source;
use crate::task::{Task, Topic};

const ADD_CAPACITY: usize = 25_000;
const DELETE_CAPACITY: usize = 7_000;
const RETRY_CAPACITY: usize = 5_000;

const ADD_FLUSH_COUNT: usize = 1_000;
const ADD_FLUSH_INTERVAL: Duration = Duration::from_millis(50);
const DELETE_FLUSH_INTERVAL: Duration = Duration::from_millis(30);

pub struct AddEntry {
    pub url: String,
    pub source: String,
    pub data_id: String,
    pub topic: Topic,
}

pub struct DeleteEntry {
    pub stream: String,
    pub stream_id: String,
}

/// The three sidecar channel handles a worker submits onto. Submission
/// blocks (backpressure) rather than dropping when a channel is full —
/// the channel capacities below are never grown.
#[derive(Clone)]
pub struct Sidecars {
    pub add_tx: mpsc::Sender<AddEntry>,
    pub delete_tx: mpsc::Sender<DeleteEntry>,
    pub retry_tx: mpsc::Sender<Task>,
}

impl Sidecars {
    /// Spawns the three sidecar loops and returns the submission handles.
    pub fn spawn(
        broker: Arc<Broker>,
        url_seen: Arc<dyn BloomFilter>,
        metrics: Arc<dyn EngineMetrics>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (add_tx, add_rx) = mpsc::channel(ADD_CAPACITY);
        let (delete_tx, delete_rx) = mpsc::channel(DELETE_CAPACITY);
        let (retry_tx, retry_rx) = mpsc::channel(RETRY_CAPACITY);

        tokio::spawn(run_add_sidecar(
            add_rx,
            broker.clone(),
            url_seen,
            metrics,
            shutdown.clone(),
        ));
        tokio::spawn(run_delete_sidecar(delete_rx, broker.clone(), shutdown.clone()));
        tokio::spawn(run_retry_sidecar(retry_rx, broker, shutdown.clone()));

        // keep shutdown alive for Clippy's sake across spawns above
        let _ = shutdown.has_changed();

        Self {
            add_tx,
            delete_tx,
            retry_tx,
        }
    }
}

/// Add sidecar: URL-seen Bloom-prefiltered, flushed at 1,000 buffered
/// entries or every 50ms, whichever comes first (§4.7, §8 invariant 8).
async fn run_add_sidecar(
    mut rx: mpsc::Receiver<AddEntry>,
    broker: Arc<Broker>,
    url_seen: Arc<dyn BloomFilter>,
    metrics: Arc<dyn EngineMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut batch = Vec::with_capacity(ADD_FLUSH_COUNT);
    let mut ticker = interval(ADD_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
            _ = ticker.tick() => {
                flush_add_batch(&broker, &mut batch, &url_seen, &metrics).await;
            }
            maybe_entry = rx.recv() => {
                match maybe_entry {
                    Some(entry) => {
                        batch.push(entry);
                        if batch.len() >= ADD_FLUSH_COUNT {
                            flush_add_batch(&broker, &mut batch, &url_seen, &metrics).await;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    flush_add_batch(&broker, &mut batch, &url_seen, &metrics).await;
}

fn queue_name(source: &str) -> QueueName {
    match source {
        source::HIGH => QueueName::High,
        source::STORE => QueueName::Store,
        source::RETRY => QueueName::Retry,
        _ => QueueName::Medium,
    }
}

/// Applies the URL-seen Bloom prefilter per entry before handing anything
/// to the broker (§8 invariant 8: a URL already in the filter never
/// reaches the broker).
async fn flush_add_batch(
    broker: &Arc<Broker>,
    batch: &mut Vec<AddEntry>,
    url_seen: &Arc<dyn BloomFilter>,
    metrics: &Arc<dyn EngineMetrics>,
) {
    for entry in batch.drain(..) {
        // The URL-seen prefilter only gates crawl_page entries: a
        // store_data entry's "url" field carries a temp blob id, not a
        // crawled URL, and is never a duplicate-crawl candidate.
        if entry.topic == Topic::CrawlPage {
            match url_seen.check(&entry.url).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, url = %entry.url, "bloom check failed, admitting url");
                }
            }
        }

        let task = Task::new(
            uuid::Uuid::new_v4().to_string(),
            entry.topic,
            entry.url.clone(),
            entry.source.clone(),
            entry.data_id,
        );
        broker.add(&entry.source, &task).await;
        metrics.observe_add(queue_name(&entry.source));
        if entry.topic == Topic::CrawlPage {
            if let Err(e) = url_seen.add(&entry.url).await {
                tracing::warn!(error = %e, url = %entry.url, "failed to record url as seen");
            }
        }
    }
}

/// Delete sidecar: ACK batching, flushed unconditionally every 30ms
/// (§4.7).
async fn run_delete_sidecar(
    mut rx: mpsc::Receiver<DeleteEntry>,
    broker: Arc<Broker>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut batch: Vec<DeleteEntry> = Vec::new();
    let mut ticker = interval(DELETE_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
            _ = ticker.tick() => {
                flush_delete_batch(&broker, &mut batch).await;
            }
            maybe_entry = rx.recv() => {
                match maybe_entry {
                    Some(entry) => batch.push(entry),
                    None => break,
                }
            }
        }
    }
    flush_delete_batch(&broker, &mut batch).await;
}

async fn flush_delete_batch(broker: &Arc<Broker>, batch: &mut Vec<DeleteEntry>) {
    if batch.is_empty() {
        return;
    }
    let mut by_stream: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    for entry in batch.drain(..) {
        by_stream.entry(entry.stream).or_default().push(entry.stream_id);
    }
    for (stream, ids) in by_stream {
        broker.ack(&stream, &ids).await;
    }
}

/// Retry sidecar: drains one entry at a time, no batching (§4.7).
async fn run_retry_sidecar(
    mut rx: mpsc::Receiver<Task>,
    broker: Arc<Broker>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
            maybe_task = rx.recv() => {
                match maybe_task {
                    Some(task) => {
                        if let Err(e) = broker.retry(task).await {
                            tracing::warn!(error = %e, "retry sidecar failed to schedule task");
                        }
                    }
                    None => break,
                }
            }
        }
    }
}
