//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, DwhError>;

/// Errors that are not specific to one crate
#[derive(Error, Debug)]
pub enum DwhError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl DwhError {
    /// Configuration error for an environment variable holding an unusable value
    pub fn invalid_env(var: &str, value: &str, expected: &str) -> Self {
        Self::Config(format!("{var}={value:?} is invalid, expected {expected}"))
    }
}
