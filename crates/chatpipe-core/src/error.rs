// Error types for the streaming pipeline

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while consuming or persisting an event stream
#[derive(Debug, Error)]
pub enum StreamError {
    /// Document store error
    #[error("Document store error: {0}")]
    Store(String),

    /// Event decode error
    #[error("Event decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Message document not found
    #[error("Message document not found: {0}/{1}")]
    DocumentNotFound(Uuid, String),

    /// A revision-checked update lost the race too many times
    #[error("Revision conflict on {0} after {1} attempts")]
    RevisionConflict(String, usize),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StreamError {
    /// Create a document store error
    pub fn store(msg: impl Into<String>) -> Self {
        StreamError::Store(msg.into())
    }
}
