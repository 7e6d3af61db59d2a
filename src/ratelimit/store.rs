//! Keyed state stores backing the admission algorithms.
//!
//! Each algorithm gets its own store shape. Both in-memory stores are backed by
//! a sharded [`DashMap`], so a read-modify-write on one key holds only that
//! key's shard lock and checks for keys in other shards proceed in parallel.

use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

use super::key::RateLimitKey;

/// Per-key token bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketState {
    /// Tokens left in the bucket, always within `[0, quota]`
    pub tokens: u32,
    /// Epoch milliseconds of the last refill (or creation)
    pub last_refill_millis: i64,
}

impl TokenBucketState {
    /// A full bucket created at `now_millis`.
    pub fn full(quota: u32, now_millis: i64) -> Self {
        Self {
            tokens: quota,
            last_refill_millis: now_millis,
        }
    }
}

/// Keyed-state store used by the token bucket.
///
/// `get` and `put` are plain reads and writes; the token bucket only ever goes
/// through `update`, the atomic read-modify-write path.
pub trait TokenBucketStore: Send + Sync {
    /// Snapshot of the state for `key`, if any.
    fn get(&self, key: &RateLimitKey) -> Option<TokenBucketState>;

    /// Insert or overwrite the state for `key`.
    fn put(&self, key: &RateLimitKey, state: TokenBucketState) -> TokenBucketState;

    /// Run `f` on the state for `key`, creating it with `init` if absent.
    ///
    /// No other update for the same key can interleave with `f`.
    fn update<R, I, F>(&self, key: &RateLimitKey, init: I, f: F) -> R
    where
        I: FnOnce() -> TokenBucketState,
        F: FnOnce(&mut TokenBucketState) -> R;

    /// Number of keys with state.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry last refilled before `cutoff_millis`. Returns the number removed.
    fn remove_refilled_before(&self, cutoff_millis: i64) -> usize;

    /// Drop all state.
    fn clear(&self);
}

/// Keyed-sequence store used by the sliding window.
pub trait SlidingWindowStore: Send + Sync {
    /// Snapshot of the admitted timestamps for `key`, oldest first.
    fn get(&self, key: &RateLimitKey) -> Option<Vec<i64>>;

    /// Run `f` on the timestamp sequence for `key`, creating an empty one if absent.
    ///
    /// No other access to the same key can interleave with `f`.
    fn with_timestamps<R, F>(&self, key: &RateLimitKey, f: F) -> R
    where
        F: FnOnce(&mut VecDeque<i64>) -> R;

    /// Number of keys with state.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every sequence whose newest timestamp is before `cutoff_millis`,
    /// including empty ones. Returns the number removed.
    fn remove_inactive_before(&self, cutoff_millis: i64) -> usize;

    /// Drop all state.
    fn clear(&self);
}

/// In-memory token bucket store.
#[derive(Debug, Default)]
pub struct InMemoryTokenBucketStore {
    states: DashMap<RateLimitKey, TokenBucketState>,
}

impl InMemoryTokenBucketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenBucketStore for InMemoryTokenBucketStore {
    fn get(&self, key: &RateLimitKey) -> Option<TokenBucketState> {
        self.states.get(key).map(|s| *s)
    }

    fn put(&self, key: &RateLimitKey, state: TokenBucketState) -> TokenBucketState {
        self.states.insert(key.clone(), state);
        state
    }

    fn update<R, I, F>(&self, key: &RateLimitKey, init: I, f: F) -> R
    where
        I: FnOnce() -> TokenBucketState,
        F: FnOnce(&mut TokenBucketState) -> R,
    {
        // Fast path avoids cloning the key for existing entries.
        if let Some(mut state) = self.states.get_mut(key) {
            return f(state.value_mut());
        }

        let mut state = self.states.entry(key.clone()).or_insert_with(|| {
            let state = init();
            debug!(key = %key, tokens = state.tokens, "Creating token bucket state");
            state
        });
        f(state.value_mut())
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn remove_refilled_before(&self, cutoff_millis: i64) -> usize {
        let before = self.states.len();
        self.states
            .retain(|_, state| state.last_refill_millis >= cutoff_millis);
        before.saturating_sub(self.states.len())
    }

    fn clear(&self) {
        self.states.clear();
    }
}

/// In-memory sliding window store.
#[derive(Debug, Default)]
pub struct InMemorySlidingWindowStore {
    windows: DashMap<RateLimitKey, VecDeque<i64>>,
}

impl InMemorySlidingWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlidingWindowStore for InMemorySlidingWindowStore {
    fn get(&self, key: &RateLimitKey) -> Option<Vec<i64>> {
        self.windows
            .get(key)
            .map(|timestamps| timestamps.iter().copied().collect())
    }

    fn with_timestamps<R, F>(&self, key: &RateLimitKey, f: F) -> R
    where
        F: FnOnce(&mut VecDeque<i64>) -> R,
    {
        if let Some(mut timestamps) = self.windows.get_mut(key) {
            return f(timestamps.value_mut());
        }

        let mut timestamps = self.windows.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "Creating sliding window state");
            VecDeque::new()
        });
        f(timestamps.value_mut())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }

    fn remove_inactive_before(&self, cutoff_millis: i64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            matches!(timestamps.back(), Some(&newest) if newest >= cutoff_millis)
        });
        before.saturating_sub(self.windows.len())
    }

    fn clear(&self) {
        self.windows.clear();
    }
}
