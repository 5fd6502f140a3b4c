//! Politeness gate (component E): the per-host token-bucket check that
//! decides whether a fetch to a given host may proceed right now.
//!
//! The token-bucket bookkeeping lives entirely inside two Redis-side Lua
//! scripts, invoked atomically via `redis::Script`/EVALSHA — the gate's
//! `allowed` decision from the access script is authoritative; this crate
//! never re-derives it client-side from the returned token count (§4.5).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

use crate::collaborators::RobotsParser;
use crate::error::EngineError;

/// Refill policy: `tokens = floor((now - refill_time) / delay_seconds)`,
/// capped at `max_tokens_num`; on a successful decrement, `refill_time`
/// advances by `tokens_consumed * delay_seconds`. Embedded as a build-time
/// asset rather than loaded from the environment (§10).
///
/// The reply's third element is an existence flag: `0` when `HGETALL`
/// found no host record at all, `1` whenever one exists — including a
/// host whose stored `rules` is the empty string (an explicitly
/// unrestricted host, written by the fetch_rules hard-failure path).
/// Without this flag those two states are indistinguishable from the
/// returned `rules` string alone, and the caller cannot tell "ask
/// fetch_rules for this host" apart from "this host has no robots
/// restrictions, proceed".
const ACCESS_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])

local h = redis.call('HGETALL', key)
if #h == 0 then
    return {'', 0, 0}
end

local data = {}
for i = 1, #h, 2 do
    data[h[i]] = h[i + 1]
end

local delay = tonumber(data['delay']) or 1000
local max_tokens = tonumber(data['max_tokens_num']) or 0
local tokens = tonumber(data['tokens_num']) or 0
local refill_time = tonumber(data['refill_time']) or now
local rules = data['rules'] or ''

local delay_seconds = delay / 1000
local elapsed = now - refill_time
if elapsed > 0 and delay_seconds > 0 then
    local refillable = math.floor(elapsed / delay_seconds)
    if refillable > 0 then
        tokens = math.min(max_tokens, tokens + refillable)
        refill_time = refill_time + (refillable * delay_seconds)
    end
end

local allowed = 0
if tokens > 0 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HSET', key, 'tokens_num', tokens, 'refill_time', refill_time)

return {rules, allowed, 1}
"#;

/// Adaptive host-limit nudge. Its internal growth policy is an
/// intentional black box (§9 Open Question) — this crate invokes it
/// atomically server-side and does not attempt to reimplement its policy.
const UPDATE_SCRIPT: &str = r#"
local key = KEYS[1]
local h = redis.call('HGETALL', key)
if #h == 0 then
    return 0
end
local data = {}
for i = 1, #h, 2 do
    data[h[i]] = h[i + 1]
end
local max_tokens = tonumber(data['max_tokens_num']) or 0
redis.call('HSET', key, 'max_tokens_num', max_tokens + 1)
return 1
"#;

pub struct RateLimitResult {
    pub allowed: bool,
    pub rules: String,
}

/// Outcome of `get_rules`: either the host has a politeness record (with
/// its own allow/deny decision and rules text, possibly empty/unrestricted),
/// or no record exists yet and the caller must go through fetch_rules first.
pub enum HostLookup {
    Found(RateLimitResult),
    Missing,
}

pub struct PolitenessGate {
    redis: Arc<ConnectionManager>,
    access_script: redis::Script,
    update_script: redis::Script,
    robots: Arc<dyn RobotsParser>,
}

impl PolitenessGate {
    pub fn new(redis: Arc<ConnectionManager>, robots: Arc<dyn RobotsParser>) -> Self {
        Self {
            redis,
            access_script: redis::Script::new(ACCESS_SCRIPT),
            update_script: redis::Script::new(UPDATE_SCRIPT),
            robots,
        }
    }

    fn host_key(host: &str) -> String {
        format!("host:{host}")
    }

    /// `GetRules` (§4.5): returns the authoritative allow/deny decision
    /// plus the raw rules text, or `HostLookup::Missing` when the host has
    /// never been seen (no politeness record at all, distinct from a
    /// record whose rules text happens to be empty).
    pub async fn get_rules(&self, host: &str) -> Result<HostLookup, EngineError> {
        let now = crate::task::now_unix();
        let mut conn = (*self.redis).clone();
        let (rules, allowed, exists): (String, i64, i64) = self
            .access_script
            .key(Self::host_key(host))
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(EngineError::Redis)?;
        if exists == 0 {
            return Ok(HostLookup::Missing);
        }
        Ok(HostLookup::Found(RateLimitResult {
            allowed: allowed == 1,
            rules,
        }))
    }

    /// `UpdateHostLimit` (§4.5): server-side adaptive nudge, black box by
    /// design.
    pub async fn update_host_limit(&self, host: &str) -> Result<(), EngineError> {
        let mut conn = (*self.redis).clone();
        let _: i64 = self
            .update_script
            .key(Self::host_key(host))
            .invoke_async(&mut conn)
            .await
            .map_err(EngineError::Redis)?;
        Ok(())
    }

    /// Second half of the gate's denial condition (§4.4 step 2): whether
    /// `path` is disallowed by the host's stored robots rules. Treats an
    /// empty/never-seen `raw_rules` (host not yet crawled) as allowed.
    pub fn is_path_allowed(&self, raw_rules: &str, path: &str) -> bool {
        if raw_rules.is_empty() {
            return true;
        }
        self.robots.is_allowed(raw_rules, path)
    }

    /// `SaveRules` (§4.5), three steps: parse, derive delay, write reset
    /// state.
    pub async fn save_rules(&self, host: &str, raw_rules: &str) -> Result<(), EngineError> {
        let group = self.robots.parse(raw_rules)?;

        let delay_ms = match group.crawl_delay_ms {
            Some(0) | None => 1,
            Some(ms) => ms,
        };

        let mut conn = (*self.redis).clone();
        let now = crate::task::now_unix();
        let key = Self::host_key(host);
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    ("tokens_num", "0".to_string()),
                    ("max_tokens_num", "0".to_string()),
                    ("refill_time", (now - 1).to_string()),
                    ("rules", raw_rules.to_string()),
                    ("delay", delay_ms.to_string()),
                ],
            )
            .await
            .map_err(EngineError::Redis)?;
        Ok(())
    }
}
