//! Error types for the Floodgate gateway.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration or rendering errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Outbound HTTP client errors
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
