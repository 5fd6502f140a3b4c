//! HTTP collaborator (§6, §9 Non-goals): fetches page bodies and a host's
//! `robots.txt`, translating transport/status outcomes into the engine's
//! closed error taxonomy. Grounded in the originating system's
//! `http_client.HTTP`: a single client with a fixed 15s/10s-dial/5s-TLS
//! timeout budget (§5), 408/429 mapped to `RetryLater`, any other 4xx
//! mapped to `InvalidStatus`.

use async_trait::async_trait;
use crawl_engine::{EngineError, FetchRulesOutcome, HttpCollaborator};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const TOTAL_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "MyCrawler/1.0";

pub struct ReqwestHttpCollaborator {
    client: Client,
}

impl ReqwestHttpCollaborator {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("building the shared reqwest client must not fail");
        Self { client }
    }

    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = resp.status();
        if status.as_u16() == 408 || status.as_u16() == 429 {
            return Err(EngineError::RetryLater(format!("{url} -> {status}")));
        }
        if status.is_client_error() {
            return Err(EngineError::InvalidStatus(format!("{url} -> {status}")));
        }
        if status.is_server_error() {
            return Err(EngineError::InternalBroker(format!(
                "{url} -> server error {status}"
            )));
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| classify_transport_error(url, &e))
    }

    /// Pull `Sitemap:` directive lines out of a robots.txt body and fetch
    /// each, extracting `<loc>` entries (§6 `fetch_rules` success path).
    async fn fetch_sitemap_urls(&self, robots_body: &str) -> Vec<String> {
        let sitemap_urls: Vec<&str> = robots_body
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                line.strip_prefix("Sitemap:")
                    .or_else(|| line.strip_prefix("sitemap:"))
                    .map(str::trim)
            })
            .collect();

        let mut urls = Vec::new();
        for sitemap_url in sitemap_urls {
            match self.fetch_raw(sitemap_url).await {
                Ok(body) => urls.extend(extract_locs(&String::from_utf8_lossy(&body))),
                Err(e) => debug!(error = %e, sitemap_url, "failed to fetch sitemap"),
            }
        }
        urls
    }
}

impl Default for ReqwestHttpCollaborator {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_transport_error(url: &str, e: &reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::RetryLater(format!("{url} timed out"))
    } else {
        EngineError::InternalBroker(format!("{url}: {e}"))
    }
}

fn extract_locs(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<loc>") {
        rest = &rest[start + "<loc>".len()..];
        if let Some(end) = rest.find("</loc>") {
            locs.push(rest[..end].trim().to_string());
            rest = &rest[end + "</loc>".len()..];
        } else {
            break;
        }
    }
    locs
}

#[async_trait]
impl HttpCollaborator for ReqwestHttpCollaborator {
    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        self.fetch_raw(url).await
    }

    async fn fetch_rules(&self, host: &str) -> Result<FetchRulesOutcome, EngineError> {
        let url = format!("https://{host}/robots.txt");
        match self.fetch_raw(&url).await {
            Ok(body) => {
                let text = String::from_utf8_lossy(&body).into_owned();
                let sitemap_urls = self.fetch_sitemap_urls(&text).await;
                Ok(FetchRulesOutcome::Rules {
                    body: text,
                    sitemap_urls,
                })
            }
            Err(EngineError::RetryLater(_)) => Ok(FetchRulesOutcome::RetryLater),
            Err(EngineError::InvalidStatus(s)) => Ok(FetchRulesOutcome::InvalidStatus(s)),
            Err(e) => {
                warn!(error = %e, host, "fetch_rules failed with an internal error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_locs_from_sitemap_xml() {
        let xml = "<urlset><url><loc>https://a.com/1</loc></url><url><loc>https://a.com/2</loc></url></urlset>";
        assert_eq!(
            extract_locs(xml),
            vec!["https://a.com/1".to_string(), "https://a.com/2".to_string()]
        );
    }

    #[test]
    fn extracts_locs_handles_empty_input() {
        assert!(extract_locs("").is_empty());
    }
}
