//! Rate limiting logic and state management.

mod algorithm;
mod key;
mod limiter;
mod rule;
mod rules;
mod service;
mod sliding_window;
mod store;
mod token_bucket;

pub use algorithm::{AlgorithmFactory, RateLimitAlgorithm};
pub use key::{RateLimitKey, KEY_SEPARATOR};
pub use limiter::RateLimiter;
pub use rule::{AlgorithmKind, Rule, RuleSpec};
pub use rules::{ConfigRuleService, RuleService, RuleTable, StaticRuleService};
pub use service::RateLimiterService;
pub use sliding_window::SlidingWindow;
pub use store::{
    InMemorySlidingWindowStore, InMemoryTokenBucketStore, SlidingWindowStore, TokenBucketState,
    TokenBucketStore,
};
pub use token_bucket::TokenBucket;
