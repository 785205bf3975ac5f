//! Error types for memoization operations
//!
//! Every variant describes a programmer or configuration mistake raised at the
//! point of misuse. Cache misses and expired entries are normal control flow and
//! never surface here.

use thiserror::Error;

/// Main error type for the memoization engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoError {
    /// A non-callable was supplied, an option was malformed, or an explicit
    /// argument list was not a list
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The wrapper factory was used as a constructor
    #[error("Usage error: {0}")]
    UsageError(String),

    /// The named property has no readable accessor
    #[error("No readable accessor `{property}` on type `{type_name}`")]
    NotFound { type_name: String, property: String },

    /// Clear was requested against something this engine never wrapped
    #[error("Not cached: {0}")]
    NotCached(String),

    /// The underlying callable failed
    #[error("Call to `{name}` failed: {message}")]
    Invocation { name: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for memoization operations
pub type Result<T> = std::result::Result<T, MemoError>;

impl From<String> for MemoError {
    fn from(s: String) -> Self {
        MemoError::Other(s)
    }
}

impl From<&str> for MemoError {
    fn from(s: &str) -> Self {
        MemoError::Other(s.to_string())
    }
}
