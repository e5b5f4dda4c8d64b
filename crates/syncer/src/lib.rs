//! Beacon Syncer - the emitter's clock
//!
//! A single task that performs the router handshake over the bus, learns
//! the router's register interval, and multiplexes three time sources into
//! coalescing event channels:
//!
//! - a sync ticker at the configured interval (full reconciliation),
//! - a router ticker at the announced register interval (full re-emit),
//! - mid-flight router announcements, which replace the router ticker
//!   after a random jitter and fire one immediate emit.
//!
//! The syncer never touches the routing table; it only fires events that
//! the watcher task consumes. Every channel has capacity 1 and is fed with
//! non-blocking sends, so bursts coalesce instead of queueing.

mod error;
mod events;
mod syncer;


pub use error::{Result, SyncerError};
pub use events::SyncEvents;
pub use syncer::Syncer;
