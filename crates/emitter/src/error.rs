//! Emitter error types

use thiserror::Error;

/// Result type for emitter operations
pub type Result<T> = std::result::Result<T, EmitError>;

/// Errors surfaced while emitting messages
#[derive(Debug, Error)]
pub enum EmitError {
    /// A registry message could not be serialized
    #[error("failed to serialize registry message: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Some bus publishes failed; the rest went out
    #[error("{failed} registry messages failed to publish")]
    PartialPublish { failed: usize },

    /// The routing API could not be reached
    #[error("routing api request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The routing API answered with a non-success status
    #[error("routing api rejected the mapping set with status {status}")]
    Rejected { status: u16 },
}
