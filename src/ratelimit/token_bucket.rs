//! Token bucket admission with whole-window refills.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::clock::Clock;

use super::algorithm::RateLimitAlgorithm;
use super::key::RateLimitKey;
use super::rule::Rule;
use super::store::{InMemoryTokenBucketStore, TokenBucketState, TokenBucketStore};

/// Token bucket algorithm.
///
/// A key starts with a full bucket of `quota` tokens. Each admitted request
/// takes one token. Refills happen only in whole windows: once at least one
/// full window has passed since the last refill, `quota` tokens are added per
/// elapsed window (capped at `quota`) and the refill time moves to `now`.
/// There is no continuous trickle between window boundaries.
pub struct TokenBucket<S = InMemoryTokenBucketStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: TokenBucketStore> TokenBucket<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Access the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

/// Apply any whole-window refill that is due at `now`.
fn refill(state: &mut TokenBucketState, rule: &Rule, now: i64) {
    // A clock that went backwards counts as no elapsed time.
    let elapsed = now.saturating_sub(state.last_refill_millis).max(0);
    let windows_elapsed = elapsed / rule.window_millis();

    if windows_elapsed >= 1 {
        let added = (windows_elapsed as u64).saturating_mul(rule.quota() as u64);
        let tokens = (state.tokens as u64).saturating_add(added);
        state.tokens = tokens.min(rule.quota() as u64) as u32;
        state.last_refill_millis = now;
    }
}

impl<S: TokenBucketStore> RateLimitAlgorithm for TokenBucket<S> {
    fn is_allowed(&self, rule: &Rule, key: &RateLimitKey) -> bool {
        let now = self.clock.now_millis();

        let (allowed, tokens) = self.store.update(
            key,
            || TokenBucketState::full(rule.quota(), now),
            |state| {
                refill(state, rule, now);

                // A rule whose quota shrank since the bucket was created.
                state.tokens = state.tokens.min(rule.quota());

                if state.tokens > 0 {
                    state.tokens -= 1;
                    (true, state.tokens)
                } else {
                    (false, state.tokens)
                }
            },
        );

        trace!(
            key = %key,
            algorithm = "token_bucket",
            tokens_remaining = tokens,
            allowed = allowed,
            "Checked token bucket"
        );

        if !allowed {
            debug!(key = %key, quota = rule.quota(), "Token bucket empty, request denied");
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
        let removed = self.store.remove_refilled_before(cutoff);
        if removed > 0 {
            debug!(removed = removed, "Evicted idle token buckets");
        }
        removed
    }

    fn reset(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::rule::AlgorithmKind;

    fn setup(window_seconds: u64, quota: u32) -> (TokenBucket, Arc<ManualClock>, Rule) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let bucket = TokenBucket::new(InMemoryTokenBucketStore::new(), clock.clone());
        let rule = Rule::new(window_seconds, quota, AlgorithmKind::TokenBucket).unwrap();
        (bucket, clock, rule)
    }

    fn key() -> RateLimitKey {
        RateLimitKey::new("api", "caller")
    }

    #[test]
    fn test_bucket_starts_full() {
        let (bucket, clock, rule) = setup(60, 5);

        assert!(bucket.is_allowed(&rule, &key()));

        let state = bucket.store().get(&key()).unwrap();
        assert_eq!(state.tokens, 4);
        assert_eq!(state.last_refill_millis, clock.now_millis());
    }

    #[test]
    fn test_quota_then_deny() {
        let (bucket, _clock, rule) = setup(60, 5);

        for i in 1..=5 {
            assert!(bucket.is_allowed(&rule, &key()), "Request {} should be allowed", i);
        }
        assert!(!bucket.is_allowed(&rule, &key()));
        assert_eq!(bucket.store().get(&key()).unwrap().tokens, 0);
    }

    #[test]
    fn test_refill_after_one_window() {
        let (bucket, clock, rule) = setup(60, 5);

        for _ in 0..5 {
            assert!(bucket.is_allowed(&rule, &key()));
        }
        assert!(!bucket.is_allowed(&rule, &key()));

        clock.advance(Duration::from_secs(60));

        for i in 1..=5 {
            assert!(bucket.is_allowed(&rule, &key()), "Request {} after refill", i);
        }
        assert!(!bucket.is_allowed(&rule, &key()));
    }

    #[test]
    fn test_no_partial_refill_inside_window() {
        let (bucket, clock, rule) = setup(60, 5);

        for _ in 0..5 {
            bucket.is_allowed(&rule, &key());
        }

        clock.advance(Duration::from_millis(59_999));
        assert!(!bucket.is_allowed(&rule, &key()));

        clock.advance(Duration::from_millis(1));
        assert!(bucket.is_allowed(&rule, &key()));
    }

    #[test]
    fn test_refill_is_capped_at_quota() {
        let (bucket, clock, rule) = setup(1, 3);

        bucket.is_allowed(&rule, &key());
        clock.advance(Duration::from_secs(3600));

        assert!(bucket.is_allowed(&rule, &key()));
        assert_eq!(bucket.store().get(&key()).unwrap().tokens, 2);
    }

    #[test]
    fn test_refill_moves_to_now() {
        let (bucket, clock, rule) = setup(10, 2);

        bucket.is_allowed(&rule, &key());
        bucket.is_allowed(&rule, &key());

        // 1.5 windows later: one refill, and the half window is dropped.
        clock.advance(Duration::from_secs(15));
        assert!(bucket.is_allowed(&rule, &key()));
        assert_eq!(
            bucket.store().get(&key()).unwrap().last_refill_millis,
            clock.now_millis()
        );
        assert!(bucket.is_allowed(&rule, &key()));
        assert!(!bucket.is_allowed(&rule, &key()));

        clock.advance(Duration::from_secs(5));
        assert!(!bucket.is_allowed(&rule, &key()));
    }

    #[test]
    fn test_denial_does_not_mutate_state() {
        let (bucket, _clock, rule) = setup(60, 1);

        assert!(bucket.is_allowed(&rule, &key()));
        let before = bucket.store().get(&key()).unwrap();

        assert!(!bucket.is_allowed(&rule, &key()));
        assert!(!bucket.is_allowed(&rule, &key()));
        assert_eq!(bucket.store().get(&key()), Some(before));
    }

    #[test]
    fn test_clock_going_backwards() {
        let (bucket, clock, rule) = setup(60, 2);

        bucket.is_allowed(&rule, &key());
        bucket.is_allowed(&rule, &key());

        clock.set(0);
        assert!(!bucket.is_allowed(&rule, &key()));
        let state = bucket.store().get(&key()).unwrap();
        assert_eq!(state.tokens, 0);
        assert_eq!(state.last_refill_millis, 1_000_000);
    }

    #[test]
    fn test_shrunken_quota_clamps_tokens() {
        let (bucket, _clock, rule) = setup(60, 10);
        bucket.is_allowed(&rule, &key());

        let smaller = Rule::new(60, 2, AlgorithmKind::TokenBucket).unwrap();
        assert!(bucket.is_allowed(&smaller, &key()));
        assert_eq!(bucket.store().get(&key()).unwrap().tokens, 1);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let (bucket, clock, rule) = setup(2, 4);

        for step in 0..200u64 {
            bucket.is_allowed(&rule, &key());
            clock.advance(Duration::from_millis(137 * (step % 7)));
            let tokens = bucket.store().get(&key()).unwrap().tokens;
            assert!(tokens <= rule.quota());
        }
    }

    #[test]
    fn test_evict_idle_and_reset() {
        let (bucket, clock, rule) = setup(1, 1);

        bucket.is_allowed(&rule, &RateLimitKey::new("api", "idle"));
        clock.advance(Duration::from_secs(120));
        bucket.is_allowed(&rule, &RateLimitKey::new("api", "busy"));
        assert_eq!(bucket.tracked_keys(), 2);

        assert_eq!(bucket.evict_idle(Duration::from_secs(60)), 1);
        assert_eq!(bucket.tracked_keys(), 1);

        bucket.reset();
        assert_eq!(bucket.tracked_keys(), 0);
    }
}
