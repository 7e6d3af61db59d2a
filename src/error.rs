//! Error types for the Gatekeeper engine.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
///
/// A denied request is not an error: admission checks return `Ok(false)`.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Rule values that violate the rule invariants
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// No rule is configured for the API and no default rule exists
    #[error("No rate limit rule configured for API '{api}'")]
    RuleNotFound { api: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatekeeperError {
    /// Whether this error comes from configuration rather than I/O.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, GatekeeperError::Io(_))
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
