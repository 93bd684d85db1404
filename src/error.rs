//! Error types for chathook
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for chathook operations
///
/// Covers configuration loading, chat storage, screenshot capture,
/// and webhook communication failures.
#[derive(Error, Debug)]
pub enum ChathookError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat storage errors (key-value store operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Screenshot capture errors
    #[error("Capture error: {0}")]
    Capture(String),

    /// Webhook returned a non-success HTTP status
    #[error("Webhook returned HTTP {status}: {message}")]
    WebhookStatus {
        /// The HTTP status code returned by the webhook
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Webhook request exhausted its retry budget
    #[error("Failed after {attempts} attempts: {source}")]
    WebhookRetriesExhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        #[source]
        source: Box<ChathookError>,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for chathook operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
