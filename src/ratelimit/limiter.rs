//! Public admission entry point.

use std::time::Duration;
use tracing::{debug, trace};

use super::key::RateLimitKey;
use super::rules::{ConfigRuleService, RuleService};
use super::service::RateLimiterService;
use super::store::{
    InMemorySlidingWindowStore, InMemoryTokenBucketStore, SlidingWindowStore, TokenBucketStore,
};
use crate::error::Result;

/// The rate limiter facade.
///
/// Resolves the rule for an API, derives the `api:caller` key and asks the
/// matching algorithm for a verdict. Every call re-evaluates; nothing is
/// cached between calls.
///
/// This struct is thread-safe and can be shared across threads behind a
/// reference or an `Arc`.
pub struct RateLimiter<
    R = ConfigRuleService,
    T = InMemoryTokenBucketStore,
    W = InMemorySlidingWindowStore,
> {
    rules: R,
    service: RateLimiterService<T, W>,
}

impl<R: RuleService> RateLimiter<R> {
    /// Create a rate limiter with in-memory state and the system clock.
    pub fn new(rules: R) -> Self {
        Self::with_service(rules, RateLimiterService::default())
    }
}

impl<R: RuleService, T: TokenBucketStore, W: SlidingWindowStore> RateLimiter<R, T, W> {
    /// Create a rate limiter over an explicitly built service.
    pub fn with_service(rules: R, service: RateLimiterService<T, W>) -> Self {
        Self { rules, service }
    }

    /// Check whether a request from `caller` to `api` may proceed.
    ///
    /// Returns `Ok(false)` when the request is over its limit. Errors only
    /// come from rule resolution.
    pub fn is_allowed(&self, api: &str, caller: &str) -> Result<bool> {
        let rule = self.rules.get_rule(api)?;
        let key = RateLimitKey::new(api, caller);

        trace!(
            key = %key,
            window_seconds = rule.window_seconds(),
            quota = rule.quota(),
            "Checking rate limit"
        );

        let allowed = self.service.is_allowed(&rule, &key);
        if !allowed {
            debug!(api = %api, caller = %caller, "Rate limit exceeded");
        }
        Ok(allowed)
    }

    /// Get the rule service.
    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Get the dispatch service.
    pub fn service(&self) -> &RateLimiterService<T, W> {
        &self.service
    }

    /// Get the number of keys with admission state.
    pub fn tracked_keys(&self) -> usize {
        self.service.tracked_keys()
    }

    /// Remove state for keys untouched for longer than `max_idle`.
    ///
    /// Never runs on its own; callers decide when idle state is reclaimed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.service.evict_idle(max_idle)
    }

    /// Clear all admission state.
    pub fn reset(&self) {
        self.service.reset();
    }
}
