//! Beacon Handler - the routing table's single mutator
//!
//! Two pieces live here:
//!
//! - [`Handler`] translates cluster state events into table mutations and
//!   pushes the resulting diffs through the emitters. It is the only code
//!   that touches the live table, so the table needs no locks.
//! - [`Watcher`] is the event task: it consumes the syncer's sync/emit
//!   channels and the raw event stream, serializing everything into
//!   `Handler` calls. During a full scan it buffers in-flight events so
//!   the swap cannot undo them.
//!
//! The cluster state store is reached through [`ClusterStateSource`]; the
//! binary wires an HTTP implementation, tests an in-memory one.

mod handler;
mod source;
pub mod testing;
mod watcher;


pub use handler::Handler;
pub use source::{ClusterStateSource, HttpStateSource, StateSourceError};
pub use watcher::Watcher;
