//! Concrete production implementations of `crawl_engine`'s collaborator
//! traits (§1/§9: the engine owns *when* and *whether* to call these, never
//! *how* they work internally). Each submodule backs exactly one trait.

pub mod http;
pub mod links;
pub mod redis_store;
pub mod robots;

pub use http::ReqwestHttpCollaborator;
pub use links::ScraperLinkExtractor;
pub use redis_store::{RedisBlobStore, RedisBloomFilter, RedisMetadataStore};
pub use robots::SimpleRobotsParser;
