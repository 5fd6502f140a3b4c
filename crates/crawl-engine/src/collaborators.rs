//! Capability interfaces for every external system the engine talks to but
//! does not own the internals of (§1 Non-goals, §9 design note: cyclic
//! object graphs and global singletons are resolved through explicit
//! injected collaborators, not ambient state).
//!
//! Each trait is deliberately narrow — exactly the operations the engine's
//! components call — so a production binary can wire real
//! HTTP/robots/blob/metadata/bloom implementations while tests wire an
//! in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::EngineError;

/// Outcome of fetching a host's robots rules (§4.4, §6).
pub enum FetchRulesOutcome {
    Rules {
        body: String,
        sitemap_urls: Vec<String>,
    },
    RetryLater,
    InvalidStatus(String),
}

/// The out-of-scope HTTP client + robots.txt translation layer. The 15s /
/// 10s-dial / 5s-TLS timeout budget (§5) is the implementation's
/// responsibility; the trait only exposes the two operations the worker
/// loop calls.
#[async_trait]
pub trait HttpCollaborator: Send + Sync {
    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, EngineError>;
    async fn fetch_rules(&self, host: &str) -> Result<FetchRulesOutcome, EngineError>;
}

/// Parsed robots.txt group rules, as handed back by the robots-parsing
/// collaborator (out of scope per §1, but the Politeness Gate's
/// orchestration around it — §4.5 `save_rules` — is in scope).
pub struct RobotsGroup {
    pub crawl_delay_ms: Option<u64>,
}

/// Out of scope per §1 (the engine owns *when* to consult robots rules, not
/// the parsing semantics); this seam is what `save_rules` (§4.5) and the
/// `crawl_page` dispatch arm (§4.4) call through.
pub trait RobotsParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<RobotsGroup, EngineError>;

    /// Whether `path` is allowed under the group matching `MyCrawler` (or
    /// `*` if no specific group exists) in `raw`. The authoritative
    /// allow/deny decision for a fetch is the Politeness Gate's token
    /// bucket (§4.5); this is the second half of the gate's denial
    /// condition ("robots.txt disallows", §4.4 step 2).
    fn is_allowed(&self, raw: &str, path: &str) -> bool;
}

/// Out of scope per §1 ("HTML parsing / link extraction"): the worker loop
/// calls this to turn a fetched page body into outbound absolute URLs
/// (§4.4 `crawl_page` step 4) without owning any parsing logic itself.
pub trait LinkExtractor: Send + Sync {
    fn extract_links(&self, body: &[u8], base_url: &str) -> Vec<String>;
}

/// Metadata row written by the `store_data` topic handler (§6 supplement).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub url: String,
    pub host: String,
    pub html_hash: String,
    pub latency_ms: u64,
    pub time: chrono::DateTime<chrono::Utc>,
    pub content_length: usize,
}

/// The out-of-scope metadata database: one table, URL primary key.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn write(&self, metadata: Metadata) -> Result<(), EngineError>;
}

/// The temporary page blob (`temp:<uuid>`, 24h TTL, §3.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageBlob {
    pub metadata: Metadata,
    pub content: Vec<u8>,
}

/// The out-of-scope blob store behind the temporary page cache.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn save(&self, id: &str, blob: &PageBlob) -> Result<(), EngineError>;
    async fn load(&self, id: &str) -> Result<Option<PageBlob>, EngineError>;
}

/// Membership-test collaborator backing both the URL-seen filter and the
/// content-hash dedup filter (§6: `url_filter`/`hash_filter`, both Redis
/// Bloom-module filters, capacity 100,000, error rate 0.01).
#[async_trait]
pub trait BloomFilter: Send + Sync {
    /// `true` if the value may already be present (a Bloom filter never
    /// false-negatives, but may false-positive).
    async fn check(&self, value: &str) -> Result<bool, EngineError>;
    async fn add(&self, value: &str) -> Result<(), EngineError>;
}

/// In-memory fakes for tests — exact membership, no false positives,
/// which is a strictly stronger guarantee than the Bloom filters they
/// stand in for and therefore a safe substitute in unit tests.
#[derive(Default)]
pub struct InMemoryBloomFilter {
    seen: Mutex<std::collections::HashSet<String>>,
}

#[async_trait]
impl BloomFilter for InMemoryBloomFilter {
    async fn check(&self, value: &str) -> Result<bool, EngineError> {
        Ok(self.seen.lock().unwrap().contains(value))
    }

    async fn add(&self, value: &str) -> Result<(), EngineError> {
        self.seen.lock().unwrap().insert(value.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    pub rows: Mutex<Vec<Metadata>>,
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn write(&self, metadata: Metadata) -> Result<(), EngineError> {
        self.rows.lock().unwrap().push(metadata);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, PageBlob>>,
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn save(&self, id: &str, blob: &PageBlob) -> Result<(), EngineError> {
        self.blobs.lock().unwrap().insert(id.to_string(), blob.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<PageBlob>, EngineError> {
        Ok(self.blobs.lock().unwrap().get(id).cloned())
    }
}

/// Test fake that discovers no outbound links, for worker-loop tests that
/// only care about the fetch/store path.
#[derive(Default)]
pub struct NoLinksExtractor;

impl LinkExtractor for NoLinksExtractor {
    fn extract_links(&self, _body: &[u8], _base_url: &str) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_bloom_filter_tracks_additions() {
        let filter = InMemoryBloomFilter::default();
        assert!(!filter.check("https://a").await.unwrap());
        filter.add("https://a").await.unwrap();
        assert!(filter.check("https://a").await.unwrap());
    }

    #[tokio::test]
    async fn in_memory_blob_store_round_trips() {
        let store = InMemoryBlobStore::default();
        let blob = PageBlob {
            metadata: Metadata {
                url: "https://a".into(),
                host: "a".into(),
                html_hash: "deadbeef".into(),
                latency_ms: 12,
                time: chrono::Utc::now(),
                content_length: 3,
            },
            content: vec![1, 2, 3],
        };
        store.save("id-1", &blob).await.unwrap();
        let loaded = store.load("id-1").await.unwrap();
        assert_eq!(loaded, Some(blob));
    }
}
