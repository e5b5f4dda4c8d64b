//! Bus error types

use thiserror::Error;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors surfaced by bus implementations
#[derive(Debug, Error)]
pub enum BusError {
    /// The initial connection could not be established
    #[error("failed to connect to the bus: {0}")]
    Connect(#[source] std::io::Error),

    /// The connection broke mid-operation
    #[error("bus i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The connection is gone and no further operations can succeed
    #[error("bus connection closed")]
    Closed,

    /// The peer sent something that is not valid protocol
    #[error("malformed bus protocol frame: {0}")]
    Protocol(String),
}
