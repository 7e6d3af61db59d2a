//! Admission algorithm trait and the factory that wires algorithms to stores.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clock::{Clock, SystemClock};

use super::key::RateLimitKey;
use super::rule::{AlgorithmKind, Rule};
use super::sliding_window::SlidingWindow;
use super::store::{
    InMemorySlidingWindowStore, InMemoryTokenBucketStore, SlidingWindowStore, TokenBucketStore,
};
use super::token_bucket::TokenBucket;

/// Trait for admission algorithms.
///
/// Implementations hold no per-request state of their own; everything lives
/// in the store they own.
pub trait RateLimitAlgorithm: Send + Sync {
    /// Decide whether one request for `key` may proceed under `rule`.
    fn is_allowed(&self, rule: &Rule, key: &RateLimitKey) -> bool;

    /// Number of keys this algorithm holds state for.
    fn tracked_keys(&self) -> usize;

    /// Remove state for keys untouched for longer than `max_idle`.
    ///
    /// Removal is invisible to callers as long as `max_idle` is at least as
    /// long as the window of the rule that applies to the key.
    fn evict_idle(&self, max_idle: Duration) -> usize;

    /// Drop all state.
    fn reset(&self);
}

/// Maps an [`AlgorithmKind`] to the algorithm instance that serves it.
///
/// Built once, before any check, with one store per algorithm. Lookups only
/// borrow, so the factory can be shared freely across threads.
pub struct AlgorithmFactory<T = InMemoryTokenBucketStore, W = InMemorySlidingWindowStore> {
    token_bucket: TokenBucket<T>,
    sliding_window: SlidingWindow<W>,
}

impl AlgorithmFactory {
    /// In-memory stores and the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// In-memory stores and the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_stores(
            InMemoryTokenBucketStore::new(),
            InMemorySlidingWindowStore::new(),
            clock,
        )
    }
}

impl Default for AlgorithmFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TokenBucketStore, W: SlidingWindowStore> AlgorithmFactory<T, W> {
    /// Wire each algorithm to its own store.
    pub fn with_stores(
        token_bucket_store: T,
        sliding_window_store: W,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!("Initializing admission algorithms");
        Self {
            token_bucket: TokenBucket::new(token_bucket_store, clock.clone()),
            sliding_window: SlidingWindow::new(sliding_window_store, clock),
        }
    }

    /// Get the algorithm for a kind.
    pub fn get_algorithm(&self, kind: AlgorithmKind) -> &dyn RateLimitAlgorithm {
        match kind {
            AlgorithmKind::TokenBucket => &self.token_bucket,
            AlgorithmKind::SlidingWindow => &self.sliding_window,
        }
    }

    /// Every algorithm, in a fixed order.
    pub fn algorithms(&self) -> [&dyn RateLimitAlgorithm; 2] {
        [&self.token_bucket, &self.sliding_window]
    }

    pub fn token_bucket(&self) -> &TokenBucket<T> {
        &self.token_bucket
    }

    pub fn sliding_window(&self) -> &SlidingWindow<W> {
        &self.sliding_window
    }
}
