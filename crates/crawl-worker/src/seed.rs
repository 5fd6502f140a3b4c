//! Seed-file CLI entry point (§6): one `fetch_rules` task per non-blank
//! line, submitted onto the add sidecar with an empty `data_id`.

use crawl_engine::{source, AddEntry, Sidecars, Topic};
use std::path::Path;
use tracing::{info, warn};

pub async fn load_seed_file(path: impl AsRef<Path>, sidecars: &Sidecars) -> std::io::Result<usize> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    let mut count = 0;

    for line in contents.lines() {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }

        let entry = AddEntry {
            url: url.to_string(),
            source: source::HIGH.to_string(),
            data_id: String::new(),
            topic: Topic::FetchRules,
        };
        if sidecars.add_tx.send(entry).await.is_err() {
            warn!(url, "add sidecar closed while loading seed file");
            break;
        }
        count += 1;
    }

    info!(seeded = count, path = %path.as_ref().display(), "seed file loaded");
    Ok(count)
}
