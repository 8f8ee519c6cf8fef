//! Chat relay error types.

use thiserror::Error;

/// Errors produced by the relay and the transcript store.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The provider could not be reached or rejected the request before
    /// any content was streamed.
    #[error("Provider request failed: {0}")]
    Provider(String),

    /// Transcript storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
