//! Refill / buffer layer (component D): a worker-local bounded buffer
//! backed by single-flight refills from the broker, per spec §4.3.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::broker::{Broker, Delivery};
use crate::error::EngineError;
use crate::source::Source;

const REFILL_SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Pool-wide single-flight guard: one mutex for the whole pool, shared
/// across every worker's buffer, not sharded per source (§4.3, §5).
#[derive(Default)]
pub struct FillGuard {
    in_progress: AsyncMutex<HashSet<String>>,
}

impl FillGuard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn try_start(&self, source: &str) -> bool {
        let mut in_progress = self.in_progress.lock().await;
        if in_progress.contains(source) {
            false
        } else {
            in_progress.insert(source.to_string());
            true
        }
    }

    async fn finish(&self, source: &str) {
        self.in_progress.lock().await.remove(source);
    }
}

pub struct Buffer {
    tx: mpsc::Sender<Delivery>,
    rx: AsyncMutex<mpsc::Receiver<Delivery>>,
    capacity: usize,
    broker: Arc<Broker>,
    selector: Arc<Source>,
    fill_guard: Arc<FillGuard>,
}

impl Buffer {
    /// `capacity_multiplier` is the configurable `BUFFER_CAPACITY_MULTIPLIER`
    /// (§10); the spec's baseline formula is the multiplier-2 case.
    pub fn new(
        worker_count: usize,
        capacity_multiplier: usize,
        broker: Arc<Broker>,
        selector: Arc<Source>,
        fill_guard: Arc<FillGuard>,
    ) -> Self {
        let capacity = (capacity_multiplier * worker_count).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: AsyncMutex::new(rx),
            capacity,
            broker,
            selector,
            fill_guard,
        }
    }

    fn refill_threshold(&self) -> usize {
        (self.capacity / 4).max(1)
    }

    /// `GetNextTask` (§4.3), three steps: ask the selector, fire off a
    /// refill if the buffer is getting low, then non-blocking poll.
    pub async fn get_next_task(&self) -> Option<Delivery> {
        let source = self.selector.get_current_source();

        let mut rx = self.rx.lock().await;
        let size = rx.len();
        if size < self.refill_threshold() {
            let batch = self.capacity.saturating_sub(size).max(1);
            drop(rx);
            self.spawn_refill(source.clone(), batch);
            rx = self.rx.lock().await;
        }

        rx.try_recv().ok()
    }

    fn spawn_refill(&self, source: String, batch: usize) {
        let broker = self.broker.clone();
        let selector = self.selector.clone();
        let fill_guard = self.fill_guard.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            if !fill_guard.try_start(&source).await {
                return; // a refill for this source is already in flight
            }

            let result = broker.get(&source, batch).await;
            match result {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        if tokio::time::timeout(REFILL_SEND_TIMEOUT, tx.send(delivery))
                            .await
                            .is_err()
                        {
                            debug!(source = %source, "refill push timed out, buffer full");
                            break;
                        }
                    }
                }
                Err(EngineError::NoTasks) => {
                    selector.mark_queue_failed();
                }
                Err(e) => {
                    debug!(error = %e, source = %source, "refill failed");
                    selector.mark_queue_failed();
                }
            }

            fill_guard.finish(&source).await;
        });
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
