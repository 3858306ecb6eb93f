//! Error types for memora.

use thiserror::Error;

/// Result type alias for memora operations.
pub type Result<T> = std::result::Result<T, MemoraError>;

/// Errors that can occur in memora operations.
///
/// Classification and key generation are total and never produce these;
/// they cover the configuration and construction surfaces only.
#[derive(Error, Debug)]
pub enum MemoraError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be built from the given input
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
