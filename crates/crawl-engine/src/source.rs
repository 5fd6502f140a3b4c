//! Source selector (component C): per-worker state machine deciding which
//! queue-source to read from next.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fixed 1-second backoff applied by `mark_queue_failed`. Only the retry
/// scheduler (§4.6) uses exponential backoff; this is intentionally
/// constant.
const FIXED_QUEUE_BACKOFF: Duration = Duration::from_secs(1);

pub const HIGH: &str = "queue:fetch:high";
pub const MEDIUM: &str = "queue:fetch:medium";
pub const RETRY: &str = "queue:fetch:retry";
pub const STORE: &str = "queue:store";

/// Fallback order walked by step 3 of `get_current_source` (§4.2, §8
/// invariant 6: `high -> medium -> store -> retry`).
pub const FALLBACK_ORDER: [&str; 4] = [HIGH, MEDIUM, STORE, RETRY];

struct QueueState {
    next_attempt_due: Instant,
    consecutive_failures: u32,
}

struct Inner {
    current: String,
    initial: String,
    states: HashMap<String, QueueState>,
}

/// Per-worker queue-source selector. Holds its own mutex — never shared
/// across workers (§5: "selector state under one mutex per selector").
pub struct Source {
    inner: Mutex<Inner>,
}

impl Source {
    pub fn new(initial_queue: &str) -> Self {
        let mut states = HashMap::new();
        for &name in FALLBACK_ORDER.iter() {
            states.insert(
                name.to_string(),
                QueueState {
                    next_attempt_due: Instant::now(),
                    consecutive_failures: 0,
                },
            );
        }
        Self {
            inner: Mutex::new(Inner {
                current: initial_queue.to_string(),
                initial: initial_queue.to_string(),
                states,
            }),
        }
    }

    /// Fixed 1s backoff on the current queue-source (§4.2).
    pub fn mark_queue_failed(&self) {
        let mut inner = self.inner.lock().unwrap();
        let current = inner.current.clone();
        if let Some(state) = inner.states.get_mut(&current) {
            state.consecutive_failures += 1;
            state.next_attempt_due = Instant::now() + FIXED_QUEUE_BACKOFF;
        }
    }

    /// Four-step selection algorithm (§4.2):
    /// 1. Bias to the initial queue if it's eligible and not already current.
    /// 2. Otherwise keep the current queue if it's still eligible.
    /// 3. Otherwise walk the fixed fallback order for the first eligible one.
    /// 4. Otherwise reset to the initial queue regardless of eligibility.
    pub fn get_current_source(&self) -> String {
        let mut inner = self.inner.lock().unwrap();

        if Self::check_init(&mut inner) {
            return inner.current.clone();
        }

        let now = Instant::now();
        let current_eligible = inner
            .states
            .get(&inner.current)
            .map(|s| now >= s.next_attempt_due)
            .unwrap_or(false);
        if current_eligible {
            return inner.current.clone();
        }

        Self::find_new_current(&mut inner, now);
        inner.current.clone()
    }

    fn check_init(inner: &mut Inner) -> bool {
        let now = Instant::now();
        let initial_available = inner
            .states
            .get(&inner.initial)
            .map(|s| now >= s.next_attempt_due)
            .unwrap_or(false);
        if initial_available && inner.current != inner.initial {
            inner.current = inner.initial.clone();
            return true;
        }
        false
    }

    fn find_new_current(inner: &mut Inner, now: Instant) {
        for &name in FALLBACK_ORDER.iter() {
            if name == inner.current {
                continue;
            }
            let eligible = inner
                .states
                .get(name)
                .map(|s| now >= s.next_attempt_due)
                .unwrap_or(false);
            if eligible {
                inner.current = name.to_string();
                return;
            }
        }
        inner.current = inner.initial.clone();
    }

    pub fn consecutive_failures(&self, queue: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .states
            .get(queue)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_on_the_initial_queue() {
        let s = Source::new(HIGH);
        assert_eq!(s.get_current_source(), HIGH);
    }

    #[test]
    fn falls_back_in_the_fixed_order_when_high_fails() {
        let s = Source::new(HIGH);
        s.mark_queue_failed(); // high now ineligible for 1s
        let next = s.get_current_source();
        assert_eq!(next, MEDIUM);
    }

    #[test]
    fn fallback_walks_medium_then_store_then_retry() {
        let s = Source::new(HIGH);
        s.mark_queue_failed(); // high down
        assert_eq!(s.get_current_source(), MEDIUM);
        s.mark_queue_failed(); // medium (current) down
        assert_eq!(s.get_current_source(), STORE);
        s.mark_queue_failed(); // store (current) down
        assert_eq!(s.get_current_source(), RETRY);
    }

    #[test]
    fn resets_to_initial_when_nothing_eligible() {
        let s = Source::new(HIGH);
        s.mark_queue_failed();
        s.get_current_source(); // -> medium
        s.mark_queue_failed();
        s.get_current_source(); // -> store
        s.mark_queue_failed();
        s.get_current_source(); // -> retry
        s.mark_queue_failed(); // everything down now
        assert_eq!(s.get_current_source(), HIGH);
    }

    #[test]
    fn biases_back_to_initial_once_it_recovers() {
        let s = Source::new(HIGH);
        s.mark_queue_failed();
        assert_eq!(s.get_current_source(), MEDIUM);
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(s.get_current_source(), HIGH);
    }

    #[test]
    fn consecutive_failures_accumulate_on_the_current_queue() {
        let s = Source::new(HIGH);
        s.mark_queue_failed();
        s.mark_queue_failed();
        assert_eq!(s.consecutive_failures(HIGH), 2);
    }
}
