//! Beacon Table - the diff-computing routing table
//!
//! The routing table is the content-addressed core of the emitter: a map
//! from routing keys to (routes, endpoints) pairs that computes the minimal
//! register/unregister messages on every mutation.
//!
//! # Design
//!
//! - Every mutation returns a [`MessagesToEmit`] diff; the caller decides
//!   what to do with it (publish, discard while building a snapshot, …).
//! - The table never talks to transports, clocks, or the state store. It is
//!   a plain data structure owned by a single task; there are no locks.
//! - [`Swap`](RoutingTable::swap) atomically replaces the whole table with
//!   a snapshot built by [`SnapshotBuilder`], preserving entries whose
//!   cluster domain was not confirmed fresh so that a partial state-store
//!   report can never trigger a mass-unregister storm.
//! - Modification tags gate every mutation: data is never replaced by a
//!   strictly older version.

mod entry;
mod messages;
mod snapshot;
mod table;
mod workloads;

#[cfg(test)]
mod table_test;

pub use entry::{RouteSet, RoutingTableEntry};
pub use messages::MessagesToEmit;
pub use snapshot::SnapshotBuilder;
pub use table::RoutingTable;
pub use workloads::{endpoints_for_actual, route_sets_for_desired};
