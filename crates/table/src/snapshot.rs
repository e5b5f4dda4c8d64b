//! Snapshot builder - the temp table fed from a full cluster scan

use beacon_protocol::{ActualLrp, DesiredLrp, Endpoint, RoutingKey};

use crate::entry::RouteSet;
use crate::table::RoutingTable;
use crate::workloads::{endpoints_for_actual, route_sets_for_desired};

/// Builds the short-lived table a sync swaps into the live one
///
/// Ingests every desired and actual workload from a full scan; the diffs
/// the underlying table computes along the way are discarded, because the
/// only diff that matters is the one `swap` computes against the live
/// table.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    table: RoutingTable,
}

impl SnapshotBuilder {
    /// Start an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a desired workload's route declarations
    pub fn insert_desired(&mut self, desired: &DesiredLrp) {
        for (key, routes) in route_sets_for_desired(desired) {
            let _ = self.table.set_routes(&key, routes);
        }
    }

    /// Ingest a running actual instance's endpoints
    ///
    /// Instances that are not running contribute nothing.
    pub fn insert_actual(&mut self, actual: &ActualLrp) {
        if !actual.is_running() {
            return;
        }
        for (key, endpoint) in endpoints_for_actual(actual) {
            let _ = self.table.add_endpoint(&key, endpoint);
        }
    }

    /// Set routes for a key directly
    pub fn set_routes(&mut self, key: &RoutingKey, routes: RouteSet) {
        let _ = self.table.set_routes(key, routes);
    }

    /// Add an endpoint for a key directly
    pub fn add_endpoint(&mut self, key: &RoutingKey, endpoint: Endpoint) {
        let _ = self.table.add_endpoint(key, endpoint);
    }

    /// Finish the snapshot
    pub fn build(self) -> RoutingTable {
        self.table
    }
}
