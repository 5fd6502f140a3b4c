//! The task model (component A): the unit of work flowing through every
//! queue and through the retry set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::EngineError;

/// Maximum number of retries a task may accumulate before it is dropped
/// silently rather than rescheduled.
pub const MAX_RETRIES: u32 = 5;

const BASE_DELAY_SECS: i64 = 2;
const BACKOFF_MULTIPLIER: i64 = 2;

/// One unit of crawl work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub topic: Topic,
    pub url: String,
    pub retries: u32,
    pub next_attempt_at: i64,
    pub data_id: String,
    pub source: String,
}

/// Closed set of dispatchable task kinds (worker loop dispatch table,
/// component G) — modeled as a tagged variant rather than an open string so
/// an unrecognized topic is a compile error, not a silent no-op branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    FetchRules,
    CrawlPage,
    StoreData,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchRules => "fetch_rules",
            Self::CrawlPage => "crawl_page",
            Self::StoreData => "store_data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetch_rules" => Some(Self::FetchRules),
            "crawl_page" => Some(Self::CrawlPage),
            "store_data" => Some(Self::StoreData),
            _ => None,
        }
    }
}

impl Task {
    /// Construct a fresh task for the given topic/url, sourced from the
    /// named queue, with no prior retries.
    pub fn new(id: impl Into<String>, topic: Topic, url: impl Into<String>, source: impl Into<String>, data_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic,
            url: url.into(),
            retries: 0,
            next_attempt_at: now_unix(),
            data_id: data_id.into(),
            source: source.into(),
        }
    }

    /// Task validity boundary (§3.1 / §8 invariant 2): non-empty topic is
    /// guaranteed by the `Topic` type itself; url must be non-empty,
    /// retries must be in `[0, MAX_RETRIES)`, and next_attempt_at must be
    /// non-negative.
    pub fn is_valid(&self) -> bool {
        !self.url.is_empty() && self.retries < MAX_RETRIES && self.next_attempt_at >= 0
    }

    /// The flat five-key wire payload used for live-queue stream entries:
    /// `{topic, retries, url, data_id, backoff}`. `id` and `source` are not
    /// part of this payload (§3.1 supplement note).
    pub fn encode(&self) -> Result<HashMap<String, String>, EngineError> {
        if !self.is_valid() {
            return Err(EngineError::InvalidTaskFormat(format!(
                "task {} failed validity check",
                self.id
            )));
        }
        let mut map = HashMap::with_capacity(5);
        map.insert("topic".to_string(), self.topic.as_str().to_string());
        map.insert("retries".to_string(), self.retries.to_string());
        map.insert("url".to_string(), self.url.clone());
        map.insert("data_id".to_string(), self.data_id.clone());
        map.insert("backoff".to_string(), self.next_attempt_at.to_string());
        Ok(map)
    }

    /// Reconstruct a task from a stream entry's flat field map plus the
    /// stream-assigned id and the queue it was read from.
    pub fn decode(
        id: impl Into<String>,
        fields: &HashMap<String, String>,
        source: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let topic_str = fields
            .get("topic")
            .ok_or_else(|| EngineError::InvalidTaskFormat("missing topic".into()))?;
        let topic = Topic::parse(topic_str)
            .ok_or_else(|| EngineError::InvalidTaskFormat(format!("unknown topic {topic_str}")))?;
        let url = fields
            .get("url")
            .cloned()
            .ok_or_else(|| EngineError::InvalidTaskFormat("missing url".into()))?;
        let retries = fields
            .get("retries")
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| EngineError::InvalidTaskFormat("missing or invalid retries".into()))?;
        let next_attempt_at = fields
            .get("backoff")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or_else(now_unix);
        let data_id = fields.get("data_id").cloned().unwrap_or_default();

        let task = Task {
            id: id.into(),
            topic,
            url,
            retries,
            next_attempt_at,
            data_id,
            source: source.into(),
        };
        if !task.is_valid() {
            return Err(EngineError::InvalidTaskFormat(format!(
                "decoded task {} failed validity check",
                task.id
            )));
        }
        Ok(task)
    }

    /// Full JSON encode for retry-set storage (the retry set stores the
    /// entire task, not the flat five-key stream payload).
    pub fn encode_full(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(EngineError::Serialization)
    }

    pub fn decode_full(data: &str) -> Result<Self, EngineError> {
        serde_json::from_str(data).map_err(EngineError::Serialization)
    }

    /// Deterministic exponential backoff used by the retry scheduler
    /// (§4.6): `now + base(2) * multiplier(2)^(retries - 1)` seconds,
    /// computed against `retries` *after* incrementing. No jitter — the
    /// monotonicity property (§8 invariant 3: second delay >= 2x first)
    /// depends on this being deterministic.
    pub fn next_backoff_secs(retries_after_increment: u32) -> i64 {
        debug_assert!(retries_after_increment >= 1);
        let exponent = (retries_after_increment - 1) as u32;
        BASE_DELAY_SECS * BACKOFF_MULTIPLIER.pow(exponent)
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_flat_wire_payload() {
        let task = Task::new("1", Topic::FetchRules, "https://example.com", "queue:fetch:high", "");
        let fields = task.encode().unwrap();
        let decoded = Task::decode("1", &fields, "queue:fetch:high").unwrap();
        assert_eq!(decoded.topic, task.topic);
        assert_eq!(decoded.url, task.url);
        assert_eq!(decoded.retries, task.retries);
        assert_eq!(decoded.next_attempt_at, task.next_attempt_at);
    }

    #[test]
    fn round_trips_through_full_json_encoding() {
        let task = Task::new("2", Topic::CrawlPage, "https://example.com/a", "queue:fetch:retry", "abc");
        let json = task.encode_full().unwrap();
        let decoded = Task::decode_full(&json).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn validity_boundary_rejects_empty_url() {
        let mut task = Task::new("3", Topic::StoreData, "https://x", "queue:store", "id");
        task.url = String::new();
        assert!(!task.is_valid());
        assert!(task.encode().is_err());
    }

    #[test]
    fn validity_boundary_rejects_retries_at_cap() {
        let mut task = Task::new("4", Topic::CrawlPage, "https://x", "queue:fetch:high", "");
        task.retries = MAX_RETRIES;
        assert!(!task.is_valid());

        task.retries = MAX_RETRIES - 1;
        assert!(task.is_valid());
    }

    #[test]
    fn validity_boundary_rejects_negative_next_attempt_at() {
        let mut task = Task::new("5", Topic::CrawlPage, "https://x", "queue:fetch:high", "");
        task.next_attempt_at = -1;
        assert!(!task.is_valid());
    }

    #[test]
    fn backoff_is_monotonic_and_deterministic() {
        let first = Task::next_backoff_secs(1);
        let second = Task::next_backoff_secs(2);
        assert!(second >= first * 2);
        assert_eq!(first, 2);
        assert_eq!(second, 4);
        assert_eq!(Task::next_backoff_secs(3), 8);
    }

    #[test]
    fn topic_round_trips_through_its_string_form() {
        for t in [Topic::FetchRules, Topic::CrawlPage, Topic::StoreData] {
            assert_eq!(Topic::parse(t.as_str()), Some(t));
        }
        assert_eq!(Topic::parse("unknown"), None);
    }
}
