//! Error types for the discount agent.

use std::time::Duration;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fallback error: {0}")]
    Fallback(#[from] FallbackError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors (startup and reload only).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Alias '{alias}' maps to both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage capability errors — the one fatal condition for a request.
///
/// The issuance guard refuses to guess eligibility when storage is down;
/// the request surfaces an `error` conversation status instead.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Append failed: {0}")]
    Append(String),

    #[error("Query failed: {0}")]
    Query(String),
}

/// External classifier errors — recovered locally by the retry policy
/// in the bounded fallback caller, never propagated past the cascade.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("Classifier attempt timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Classifier transport failure: {0}")]
    Transport(String),

    #[error("Malformed classifier response: {0}")]
    Malformed(String),

    #[error("Classifier returned a handle outside the allow-list: {0}")]
    Disallowed(String),
}

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid message: {0}")]
    Validation(String),

    #[error("Unknown creator handle: {0}")]
    UnknownCreator(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
