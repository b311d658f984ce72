//! Error types — unified error handling across OpsFlow crates.

use thiserror::Error;

/// All the ways an OpsFlow operation can fail.
#[derive(Error, Debug)]
pub enum OpsflowError {
    /// A pipeline stage failed; the run is abandoned.
    #[error("stage '{stage}' in pipeline '{pipeline}' failed: {message}")]
    Stage {
        pipeline: String,
        stage: String,
        message: String,
    },

    /// An outbound HTTP call failed (transport, timeout, non-2xx).
    #[error("external call failed: {0}")]
    ExternalCall(String),

    /// The model replied with something we could not parse.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// No scheduled task registered under this name.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// No pipeline in the catalog under this name.
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Record store error.
    #[error("store error: {0}")]
    Store(String),

    /// Tool invocation error.
    #[error("tool error: {0}")]
    Tool(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OpsflowError {
    /// Wrap any stage-level failure with its pipeline and stage names.
    pub fn stage(pipeline: impl Into<String>, stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            pipeline: pipeline.into(),
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Result type used throughout OpsFlow.
pub type Result<T> = std::result::Result<T, OpsflowError>;
