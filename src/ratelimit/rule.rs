//! Rate limit rules: window, quota and algorithm.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GatekeeperError, Result};

/// Admission algorithm selected by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Fixed-capacity counter refilled in whole-window increments
    TokenBucket,
    /// Rolling log of admitted timestamps
    SlidingWindow,
}

impl AlgorithmKind {
    /// Name used in configuration files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::TokenBucket => "token_bucket",
            AlgorithmKind::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated rule as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Window length in seconds
    pub window_seconds: u64,
    /// Requests admitted per window
    pub quota: u32,
    /// Algorithm to apply
    pub algorithm: AlgorithmKind,
}

/// An immutable, validated rate limit rule.
///
/// Quota and window are always positive, so the algorithms never divide by
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec", into = "RuleSpec")]
pub struct Rule {
    window_seconds: u64,
    quota: u32,
    kind: AlgorithmKind,
}

impl Rule {
    /// Create a rule, rejecting a zero window or zero quota.
    pub fn new(window_seconds: u64, quota: u32, kind: AlgorithmKind) -> Result<Self> {
        if window_seconds == 0 {
            return Err(GatekeeperError::InvalidRule(
                "window_seconds must be greater than 0".to_string(),
            ));
        }
        if quota == 0 {
            return Err(GatekeeperError::InvalidRule(
                "quota must be greater than 0".to_string(),
            ));
        }
        // Window in milliseconds must fit the i64 arithmetic used by the algorithms.
        if window_seconds > (i64::MAX as u64) / 1000 {
            return Err(GatekeeperError::InvalidRule(format!(
                "window_seconds {} is too large",
                window_seconds
            )));
        }

        Ok(Self {
            window_seconds,
            quota,
            kind,
        })
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Window length in milliseconds, always positive.
    pub fn window_millis(&self) -> i64 {
        (self.window_seconds * 1000) as i64
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }
}

impl Default for Rule {
    /// 20 requests per minute, token bucket.
    fn default() -> Self {
        Self {
            window_seconds: 60,
            quota: 20,
            kind: AlgorithmKind::TokenBucket,
        }
    }
}

impl TryFrom<RuleSpec> for Rule {
    type Error = GatekeeperError;

    fn try_from(spec: RuleSpec) -> Result<Self> {
        Rule::new(spec.window_seconds, spec.quota, spec.algorithm)
    }
}

impl From<Rule> for RuleSpec {
    fn from(rule: Rule) -> Self {
        Self {
            window_seconds: rule.window_seconds,
            quota: rule.quota,
            algorithm: rule.kind,
        }
    }
}
