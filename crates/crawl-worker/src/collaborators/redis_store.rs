//! Redis-backed blob store, metadata store and Bloom filters (§3.4, §6
//! supplement). Follows the same `Arc<ConnectionManager>` + per-call
//! clone idiom as `PolitenessGate`/`RetryScheduler`.
//!
//! The metadata store is a deliberate divergence from the originating
//! system, which wrote metadata rows into Cassandra. This workspace has
//! no Cassandra/Scylla driver anywhere in its dependency stack, and
//! adding one to back a single `{url, host, html_hash, latency_ms, time,
//! content_length}` row would be a fabricated dependency with nothing
//! else in the crate to justify it. A Redis hash keyed by URL captures
//! the same schema with the crate's one existing datastore (see
//! DESIGN.md).

use async_trait::async_trait;
use crawl_engine::{BlobStore, BloomFilter, Metadata, MetadataStore, PageBlob};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

use crawl_engine::EngineError;

const BLOB_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct RedisBlobStore {
    redis: Arc<ConnectionManager>,
}

impl RedisBlobStore {
    pub fn new(redis: Arc<ConnectionManager>) -> Self {
        Self { redis }
    }

    fn key(id: &str) -> String {
        format!("temp:{id}")
    }
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn save(&self, id: &str, blob: &PageBlob) -> Result<(), EngineError> {
        let payload = serde_json::to_string(blob)?;
        let mut conn = (*self.redis).clone();
        let _: () = conn
            .set_ex(Self::key(id), payload, BLOB_TTL.as_secs())
            .await
            .map_err(EngineError::Redis)?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<PageBlob>, EngineError> {
        let mut conn = (*self.redis).clone();
        let payload: Option<String> = conn.get(Self::key(id)).await.map_err(EngineError::Redis)?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(EngineError::from))
            .transpose()
    }
}

pub struct RedisMetadataStore {
    redis: Arc<ConnectionManager>,
}

impl RedisMetadataStore {
    pub fn new(redis: Arc<ConnectionManager>) -> Self {
        Self { redis }
    }

    fn key(url: &str) -> String {
        format!("metadata:{url}")
    }
}

#[async_trait]
impl MetadataStore for RedisMetadataStore {
    async fn write(&self, metadata: Metadata) -> Result<(), EngineError> {
        let payload = serde_json::to_string(&metadata)?;
        let mut conn = (*self.redis).clone();
        let _: () = conn
            .set(Self::key(&metadata.url), payload)
            .await
            .map_err(EngineError::Redis)?;
        Ok(())
    }
}

/// Backed by Redis's own `BF.ADD`/`BF.EXISTS` module commands, shared by
/// both the URL-seen filter and the content-hash dedup filter (capacity
/// 100,000, error rate 0.01 — reserved server-side on first `BF.ADD`).
pub struct RedisBloomFilter {
    redis: Arc<ConnectionManager>,
    filter_key: String,
}

impl RedisBloomFilter {
    pub fn new(redis: Arc<ConnectionManager>, filter_key: impl Into<String>) -> Self {
        Self {
            redis,
            filter_key: filter_key.into(),
        }
    }
}

#[async_trait]
impl BloomFilter for RedisBloomFilter {
    async fn check(&self, value: &str) -> Result<bool, EngineError> {
        let mut conn = (*self.redis).clone();
        let exists: i64 = redis::cmd("BF.EXISTS")
            .arg(&self.filter_key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(EngineError::Redis)?;
        Ok(exists == 1)
    }

    async fn add(&self, value: &str) -> Result<(), EngineError> {
        let mut conn = (*self.redis).clone();
        let _: i64 = redis::cmd("BF.ADD")
            .arg(&self.filter_key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(EngineError::Redis)?;
        Ok(())
    }
}
