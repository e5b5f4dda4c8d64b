//! Syncer error types

use beacon_bus::BusError;
use thiserror::Error;

/// Result type for syncer operations
pub type Result<T> = std::result::Result<T, SyncerError>;

/// Fatal startup failures
///
/// Everything after a successful handshake is absorbed and retried by the
/// next tick; only the initial bus interactions can kill the process.
#[derive(Debug, Error)]
pub enum SyncerError {
    /// A handshake subscription could not be established
    #[error("failed to subscribe for router announcements: {0}")]
    Subscribe(#[source] BusError),

    /// A greeting could not be published
    #[error("failed to publish greeting: {0}")]
    Greet(#[source] BusError),
}
