//! robots.txt parsing (§4.4 step 2, §4.5 `save_rules`). Out of scope per
//! the engine's own Non-goals — no Rust crate in the dependency stack
//! covers this, so it is hand-rolled at the narrow seam `RobotsParser`
//! exposes: group matching for `MyCrawler` (falling back to `*`), a
//! `Crawl-delay` directive, and `Disallow` path prefix matching.

use crawl_engine::{EngineError, RobotsGroup, RobotsParser};

const USER_AGENT: &str = "MyCrawler";

#[derive(Default)]
pub struct SimpleRobotsParser;

/// One `User-agent:` block and the `Disallow`/`Crawl-delay` lines under it.
struct Group<'a> {
    agents: Vec<&'a str>,
    disallow: Vec<&'a str>,
    crawl_delay_ms: Option<u64>,
}

fn parse_groups(raw: &str) -> Vec<Group<'_>> {
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Option<Group> = None;

    for line in raw.lines() {
        let line = match line.split('#').next() {
            Some(l) => l.trim(),
            None => continue,
        };
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if current.as_ref().is_some_and(|g| !g.disallow.is_empty() || g.crawl_delay_ms.is_some()) {
                    groups.push(current.take().unwrap());
                }
                let group = current.get_or_insert_with(|| Group {
                    agents: Vec::new(),
                    disallow: Vec::new(),
                    crawl_delay_ms: None,
                });
                group.agents.push(value);
            }
            "disallow" if !value.is_empty() => {
                if let Some(group) = current.as_mut() {
                    group.disallow.push(value);
                }
            }
            "crawl-delay" => {
                if let Some(group) = current.as_mut() {
                    group.crawl_delay_ms = value.parse::<f64>().ok().map(|s| (s * 1000.0) as u64);
                }
            }
            _ => {}
        }
    }
    if let Some(group) = current {
        groups.push(group);
    }
    groups
}

fn matching_group<'a>(groups: &'a [Group<'a>], user_agent: &str) -> Option<&'a Group<'a>> {
    groups
        .iter()
        .find(|g| g.agents.iter().any(|a| a.eq_ignore_ascii_case(user_agent)))
        .or_else(|| groups.iter().find(|g| g.agents.iter().any(|a| *a == "*")))
}

impl RobotsParser for SimpleRobotsParser {
    fn parse(&self, raw: &str) -> Result<RobotsGroup, EngineError> {
        let groups = parse_groups(raw);
        let crawl_delay_ms = matching_group(&groups, USER_AGENT).and_then(|g| g.crawl_delay_ms);
        Ok(RobotsGroup { crawl_delay_ms })
    }

    fn is_allowed(&self, raw: &str, path: &str) -> bool {
        let groups = parse_groups(raw);
        match matching_group(&groups, USER_AGENT) {
            Some(group) => !group.disallow.iter().any(|rule| path.starts_with(rule)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crawl_delay_for_matching_agent() {
        let raw = "User-agent: MyCrawler\nCrawl-delay: 2\nDisallow: /private\n";
        let parser = SimpleRobotsParser;
        let group = parser.parse(raw).unwrap();
        assert_eq!(group.crawl_delay_ms, Some(2000));
    }

    #[test]
    fn falls_back_to_wildcard_group() {
        let raw = "User-agent: *\nCrawl-delay: 1\nDisallow: /admin\n";
        let parser = SimpleRobotsParser;
        let group = parser.parse(raw).unwrap();
        assert_eq!(group.crawl_delay_ms, Some(1000));
        assert!(!parser.is_allowed(raw, "/admin/settings"));
        assert!(parser.is_allowed(raw, "/public"));
    }

    #[test]
    fn missing_crawl_delay_is_none() {
        let raw = "User-agent: MyCrawler\nDisallow: /x\n";
        let parser = SimpleRobotsParser;
        assert_eq!(parser.parse(raw).unwrap().crawl_delay_ms, None);
    }

    #[test]
    fn no_matching_group_allows_everything() {
        let raw = "User-agent: OtherBot\nDisallow: /x\n";
        let parser = SimpleRobotsParser;
        assert!(parser.is_allowed(raw, "/x"));
    }
}
