//! Operation-level error for the coding assistant.
//!
//! Per-item mapping problems are not errors; they are collected as
//! [`SkippedItem`](super::types::SkippedItem)s on the result instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodingError {
    /// A required prompt template failed to load. No remote call was made.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller's input violates an operation precondition.
    #[error("{0}")]
    InvalidInput(String),

    /// The remote model call failed (network, auth, quota, safety block).
    #[error("Model call failed: {0}")]
    RemoteCall(String),

    /// No structured data could be recovered from the model output.
    #[error("Failed to parse JSON response: {0}")]
    UnparsableResponse(String),
}

impl CodingError {
    /// Stable tag for callers that report errors by category.
    pub fn kind(&self) -> &'static str {
        match self {
            CodingError::Configuration(_) => "configuration",
            CodingError::InvalidInput(_) => "invalid_input",
            CodingError::RemoteCall(_) => "remote_call",
            CodingError::UnparsableResponse(_) => "unparsable_response",
        }
    }

    pub(crate) fn remote(err: anyhow::Error) -> Self {
        CodingError::RemoteCall(format!("{:#}", err))
    }
}
