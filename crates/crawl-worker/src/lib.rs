//! Crawl Worker Service
//!
//! The production binary wiring the crawl dispatch and politeness engine
//! (`crawl_engine`) to real collaborators: `reqwest` for HTTP, a hand-rolled
//! robots.txt parser, `scraper`/`url` for link extraction, and Redis for
//! blob storage, metadata, and Bloom filters.
//!
//! ## Architecture
//!
//! ```text
//! Redis Streams (queue:fetch:{high,medium}, queue:store)
//!   + Redis sorted set (queue:fetch:retry)
//!     ↓ (per-queue worker pool, §5)
//! crawl_engine::Worker  ->  HTTP / robots / links / blob / metadata / bloom
//! ```

pub mod collaborators;
pub mod connect;
pub mod pool;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use crawl_config::engine::EngineConfig;
use crawl_config::redis::RedisConfig;
use crawl_config::server::ServerConfig;
use crawl_config::{tracing as crawl_tracing, Environment, FromEnv};
use crawl_engine::collaborators::BloomFilter;
use crawl_engine::{full_admin_router, HealthState, PolitenessGate, RetryScheduler};
use eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::collaborators::{
    RedisBlobStore, RedisBloomFilter, RedisMetadataStore, ReqwestHttpCollaborator,
    ScraperLinkExtractor, SimpleRobotsParser,
};
use crate::pool::Collaborators;

const URL_FILTER_KEY: &str = "bloom:url_seen";
const HASH_FILTER_KEY: &str = "bloom:hash_seen";

/// Health server port resolution (§10): a per-binary override ahead of the
/// generic `PORT`, matching the teacher's `tasks-worker` chain.
fn health_port(server_config: &ServerConfig) -> u16 {
    std::env::var("CRAWL_WORKER_HEALTH_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(server_config.port)
}

async fn start_health_server(state: HealthState, host: &str, port: u16) -> Result<()> {
    let app: Router = full_admin_router(state);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind health server to {addr}"))?;

    info!(%addr, "health and admin server listening");
    axum::serve(listener, app)
        .await
        .wrap_err("health server failed")?;
    Ok(())
}

/// Runs the crawl worker: loads configuration, connects to Redis, wires
/// every collaborator and the worker pool, starts the health server, and
/// blocks until a shutdown signal is received.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    crawl_tracing::init_tracing(&environment);

    crawl_engine::metrics::init_metrics();
    info!(?environment, "starting crawl worker");

    let redis_config = RedisConfig::from_env().wrap_err("failed to load redis configuration")?;
    let server_config = ServerConfig::from_env().wrap_err("failed to load server configuration")?;
    let engine_config = EngineConfig::from_env().wrap_err("failed to load engine configuration")?;

    info!("connecting to redis");
    let redis = Arc::new(
        connect::connect_with_retry(&redis_config.uri)
            .await
            .wrap_err("failed to connect to redis")?,
    );
    info!("connected to redis");

    let http = Arc::new(ReqwestHttpCollaborator::new());
    let robots = Arc::new(SimpleRobotsParser);
    let link_extractor = Arc::new(ScraperLinkExtractor);
    let blob_store = Arc::new(RedisBlobStore::new(redis.clone()));
    let metadata_store = Arc::new(RedisMetadataStore::new(redis.clone()));
    let url_filter: Arc<dyn BloomFilter> =
        Arc::new(RedisBloomFilter::new(redis.clone(), URL_FILTER_KEY));
    let hash_filter: Arc<dyn BloomFilter> =
        Arc::new(RedisBloomFilter::new(redis.clone(), HASH_FILTER_KEY));
    let politeness = Arc::new(PolitenessGate::new(redis.clone(), robots));
    let metrics = Arc::new(crawl_engine::PrometheusEngineMetrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    let sidecars = pool::spawn_pool(
        redis.clone(),
        &engine_config,
        Collaborators {
            http,
            link_extractor,
            blob_store,
            metadata_store,
            url_filter,
            hash_filter,
            politeness,
            metrics,
        },
        shutdown_rx.clone(),
    )
    .await
    .wrap_err("failed to spawn worker pool")?;

    if let Some(path) = &engine_config.seed_file {
        match seed::load_seed_file(path, &sidecars).await {
            Ok(count) => info!(seeded = count, "seed file processed"),
            Err(e) => error!(error = %e, %path, "failed to load seed file"),
        }
    }

    let retry = Arc::new(RetryScheduler::new(redis.clone(), crawl_engine::source::RETRY));
    let health_state = HealthState::new(redis.clone(), crawl_engine::source::HIGH, retry);

    let host = server_config.host.clone();
    let port = health_port(&server_config);
    start_health_server(health_state, &host, port).await?;

    info!("crawl worker stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, initiating shutdown"),
        _ = terminate => info!("received sigterm, initiating shutdown"),
    }

    Ok(())
}
