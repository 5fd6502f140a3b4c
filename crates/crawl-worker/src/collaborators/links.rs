//! Outbound link extraction (§4.4 `crawl_page` step 4). Out of scope per
//! the engine's own Non-goals ("HTML parsing / link extraction"); wired
//! here with the `scraper`/`url` pair the way the citescrape example uses
//! them for anchor-tag resolution against a base URL.

use crawl_engine::LinkExtractor;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a[href]").expect("static selector is valid"))
}

#[derive(Default)]
pub struct ScraperLinkExtractor;

impl LinkExtractor for ScraperLinkExtractor {
    fn extract_links(&self, body: &[u8], base_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(base_url) else {
            return Vec::new();
        };
        let text = String::from_utf8_lossy(body);
        let document = Html::parse_document(&text);

        document
            .select(anchor_selector())
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .filter(|url| url.scheme() == "http" || url.scheme() == "https")
            .map(|mut url| {
                url.set_fragment(None);
                url.to_string()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_links_against_base() {
        let html = b"<html><body><a href=\"/about\">x</a><a href=\"https://other.com/z\">y</a></body></html>";
        let extractor = ScraperLinkExtractor;
        let links = extractor.extract_links(html, "https://example.com/page");
        assert_eq!(
            links,
            vec![
                "https://example.com/about".to_string(),
                "https://other.com/z".to_string(),
            ]
        );
    }

    #[test]
    fn strips_fragments_and_skips_non_http_schemes() {
        let html = b"<a href=\"/x#section\">a</a><a href=\"mailto:a@b.com\">b</a>";
        let extractor = ScraperLinkExtractor;
        let links = extractor.extract_links(html, "https://example.com/");
        assert_eq!(links, vec!["https://example.com/x".to_string()]);
    }

    #[test]
    fn invalid_base_url_yields_no_links() {
        let extractor = ScraperLinkExtractor;
        assert!(extractor.extract_links(b"<a href=\"/x\">a</a>", "not a url").is_empty());
    }
}
