//! Dispatch from a rule to the algorithm that enforces it.

use std::time::Duration;
use tracing::trace;

use super::algorithm::AlgorithmFactory;
use super::key::RateLimitKey;
use super::rule::Rule;
use super::store::{
    InMemorySlidingWindowStore, InMemoryTokenBucketStore, SlidingWindowStore, TokenBucketStore,
};

/// Selects the algorithm for a rule and delegates the admission check.
pub struct RateLimiterService<T = InMemoryTokenBucketStore, W = InMemorySlidingWindowStore> {
    factory: AlgorithmFactory<T, W>,
}

impl<T: TokenBucketStore, W: SlidingWindowStore> RateLimiterService<T, W> {
    pub fn new(factory: AlgorithmFactory<T, W>) -> Self {
        Self { factory }
    }

    /// Check one request for `key` under `rule`.
    pub fn is_allowed(&self, rule: &Rule, key: &RateLimitKey) -> bool {
        trace!(key = %key, algorithm = %rule.kind(), "Dispatching admission check");
        self.factory.get_algorithm(rule.kind()).is_allowed(rule, key)
    }

    /// Keys tracked across all algorithms.
    pub fn tracked_keys(&self) -> usize {
        self.factory.algorithms().iter().map(|a| a.tracked_keys()).sum()
    }

    /// Remove idle key state from every algorithm.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.factory
            .algorithms()
            .iter()
            .map(|a| a.evict_idle(max_idle))
            .sum()
    }

    /// Drop all state in every algorithm.
    pub fn reset(&self) {
        for algorithm in self.factory.algorithms() {
            algorithm.reset();
        }
    }

    pub fn factory(&self) -> &AlgorithmFactory<T, W> {
        &self.factory
    }
}

impl Default for RateLimiterService {
    fn default() -> Self {
        Self::new(AlgorithmFactory::new())
    }
}
