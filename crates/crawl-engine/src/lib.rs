//! Crawl dispatch and politeness engine.
//!
//! Owns the decision of what URL a worker fetches next, how fast it may
//! hit a given host, and what happens to a task that fails. Everything
//! this crate talks to outside itself — the HTTP client, robots.txt
//! parsing, the blob store, the metadata database, the Bloom filters — is
//! modeled as a narrow injected collaborator trait in [`collaborators`],
//! never as an owned subsystem.

pub mod broker;
pub mod buffer;
pub mod collaborators;
pub mod error;
pub mod health;
pub mod metrics;
pub mod politeness;
pub mod retry;
pub mod sidecars;
pub mod source;
pub mod task;
pub mod worker;

pub use broker::{Broker, Delivery, CONSUMER_GROUP};
pub use buffer::{Buffer, FillGuard};
pub use collaborators::{
    BlobStore, BloomFilter, FetchRulesOutcome, HttpCollaborator, LinkExtractor, Metadata,
    MetadataStore, PageBlob, RobotsGroup, RobotsParser,
};
pub use error::{EngineError, ErrorCategory};
pub use health::{full_admin_router, health_router, retry_admin_router, HealthState};
pub use metrics::{EngineMetrics, NoopEngineMetrics, PrometheusEngineMetrics, QueueName};
pub use politeness::{HostLookup, PolitenessGate, RateLimitResult};
pub use retry::RetryScheduler;
pub use sidecars::{AddEntry, DeleteEntry, Sidecars};
pub use source::Source;
pub use task::{Task, Topic, MAX_RETRIES};
pub use worker::Worker;
