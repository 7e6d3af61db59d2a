//! Gatekeeper - In-process Request Admission
//!
//! This crate decides whether a request from a caller to an API may proceed,
//! under a per-API rule that sets a quota, a time window and an algorithm
//! (token bucket or sliding window). All state is in memory, sharded by
//! `api:caller` key, and lost on restart.
//!
//! ```
//! use gatekeeper::ratelimit::{AlgorithmKind, RateLimiter, Rule, StaticRuleService};
//!
//! let rule = Rule::new(60, 2, AlgorithmKind::SlidingWindow).unwrap();
//! let limiter = RateLimiter::new(StaticRuleService::new(rule));
//!
//! assert!(limiter.is_allowed("search", "10.0.0.1").unwrap());
//! assert!(limiter.is_allowed("search", "10.0.0.1").unwrap());
//! assert!(!limiter.is_allowed("search", "10.0.0.1").unwrap());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
