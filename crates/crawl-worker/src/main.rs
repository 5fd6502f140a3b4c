//! Crawl Worker Service - Entry Point

use clap::{Parser, Subcommand};
use crawl_config::redis::RedisConfig;
use crawl_config::FromEnv;
use crawl_engine::{source, Broker, Task, Topic};
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "crawl-worker")]
#[command(about = "Crawl dispatch and politeness engine worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool and health/admin server.
    Run,

    /// Load a seed file (one URL per line) onto the high-priority queue
    /// and exit, without starting the worker pool.
    Seed {
        /// Path to the seed file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => crawl_worker::run().await,
        Commands::Seed { file } => seed_once(file).await,
    }
}

async fn seed_once(file: PathBuf) -> Result<()> {
    let redis_config = RedisConfig::from_env().wrap_err("failed to load redis configuration")?;
    let redis = Arc::new(
        crawl_worker::connect::connect_with_retry(&redis_config.uri)
            .await
            .wrap_err("failed to connect to redis")?,
    );
    let broker = Broker::new(redis, "seed");

    let contents = tokio::fs::read_to_string(&file)
        .await
        .wrap_err_with(|| format!("failed to read seed file {}", file.display()))?;

    let mut count = 0;
    for line in contents.lines() {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        let task = Task::new(
            uuid::Uuid::new_v4().to_string(),
            Topic::FetchRules,
            url,
            source::HIGH,
            "",
        );
        broker.add(source::HIGH, &task).await;
        count += 1;
    }

    info!(seeded = count, path = %file.display(), "seed file loaded");
    Ok(())
}
