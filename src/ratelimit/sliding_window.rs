//! Sliding window log admission.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::clock::Clock;

use super::algorithm::RateLimitAlgorithm;
use super::key::RateLimitKey;
use super::rule::Rule;
use super::store::{InMemorySlidingWindowStore, SlidingWindowStore};

/// Sliding window algorithm.
///
/// Keeps the timestamps of admitted requests for each key, oldest first.
/// Every check first trims timestamps older than `now - window`, then admits
/// the request if fewer than `quota` remain. Denied requests are not recorded,
/// so the log never grows past `quota` entries.
pub struct SlidingWindow<S = InMemorySlidingWindowStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: SlidingWindowStore> SlidingWindow<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Access the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SlidingWindowStore> RateLimitAlgorithm for SlidingWindow<S> {
    fn is_allowed(&self, rule: &Rule, key: &RateLimitKey) -> bool {
        let now = self.clock.now_millis();
        let window_start = now.saturating_sub(rule.window_millis());
        let quota = rule.quota() as usize;

        let (allowed, evicted, in_window) = self.store.with_timestamps(key, |timestamps| {
            let mut evicted = 0usize;
            while matches!(timestamps.front(), Some(&oldest) if oldest < window_start) {
                timestamps.pop_front();
                evicted += 1;
            }

            if timestamps.len() >= quota {
                return (false, evicted, timestamps.len());
            }

            // Keep the log ordered even if the clock stepped backwards.
            let stamp = timestamps.back().map_or(now, |&newest| newest.max(now));
            timestamps.push_back(stamp);
            (true, evicted, timestamps.len())
        });

        trace!(
            key = %key,
            algorithm = "sliding_window",
            evicted = evicted,
            in_window = in_window,
            allowed = allowed,
            "Checked sliding window"
        );

        if !allowed {
            debug!(key = %key, quota = quota, "Sliding window full, request denied");
        }

        allowed
    }

    fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(max_idle.as_millis().min(i64::MAX as u128) as i64);
        let removed = self.store.remove_inactive_before(cutoff);
        if removed > 0 {
            debug!(removed = removed, "Evicted idle sliding windows");
        }
        removed
    }

    fn reset(&self) {
        self.store.clear();
    }
}
