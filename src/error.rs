//! Error types for the data pipeline.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No bucket configured for destination {kind} (set {var})")]
    MissingBucket { kind: String, var: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Storage collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Failed to write {bucket}/{key}: {reason}")]
    WriteFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while classifying, transforming or routing an object.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Content does not match its purported type.
    #[error("not a valid {what}: {reason}")]
    Format { what: &'static str, reason: String },

    /// Upstream object or linked resource is absent (including disguised 404s).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network failure while fetching a link.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal contract violation; the only error that fails an invocation.
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub(crate) fn format(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Format {
            what,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
