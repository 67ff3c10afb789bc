//! Error types for promptweave-engine.

use thiserror::Error;

use crate::validation::ValidationFailure;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Error type for the promptweave-engine library.
#[derive(Debug, Error)]
pub enum EngineError {
    /// HTTP transport errors.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-success response from the engine.
    #[error("Engine returned status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or a fallback message.
        message: String,
    },

    /// The engine rejected the submitted job graph as invalid.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// A submitted job disappeared from both queue and history.
    #[error("Job {prompt_id} is in neither the queue nor the history")]
    JobNotFound {
        /// The submission's prompt id.
        prompt_id: String,
    },

    /// A finished job's history carries no result for a declared output.
    #[error("Job {prompt_id} produced no result for output node {key}")]
    ResultNotFound {
        /// The submission's prompt id.
        prompt_id: String,
        /// Key of the declared output node.
        key: String,
    },

    /// An output slot produced no downloadable asset.
    #[error("Output node {key} produced no downloadable asset")]
    NoAsset {
        /// Key of the declared output node.
        key: String,
    },

    /// The engine does not implement an optional housekeeping endpoint.
    #[error("Engine does not support {operation}")]
    NotSupported {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The engine refused to delete a remote input asset.
    #[error("Engine rejected deletion of {remote_name}")]
    DeleteRejected {
        /// Remote name of the asset.
        remote_name: String,
    },

    /// An upload record's content cannot be produced by the asset source.
    #[error("No local content available for upload {remote_name}")]
    AssetUnavailable {
        /// Remote name of the upload.
        remote_name: String,
    },

    /// The submission was cancelled cooperatively.
    #[error("Submission cancelled")]
    Cancelled,

    /// Local filesystem errors while reading inputs or writing outputs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response body could not be decoded.
    #[error("Malformed engine response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Compilation errors surfaced through a combined compile+submit flow.
    #[error(transparent)]
    Compile(#[from] promptweave_graph::CompileError),
}

impl EngineError {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an API error from a status code and message.
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}
