//! Error types for the threat detection core.

use thiserror::Error;

/// Result type alias for detection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for detection, monitoring and configuration
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input (empty training set, bad parameters)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model has not been trained yet
    #[error("Model not trained: {0}")]
    ModelNotTrained(String),

    /// Model training failure
    #[error("Training error: {0}")]
    Training(String),

    /// Monitor lifecycle violation
    #[error("Invalid monitor state: {0}")]
    InvalidState(String),

    /// Probe failure
    #[error("Probe error: {0}")]
    Probe(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source error
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
