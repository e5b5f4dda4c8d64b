//! Routing key - the unit of routing

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a routable target
///
/// A workload exposes one routing key per container port; routes and
/// endpoints are associated through the key, never directly with each
/// other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    /// Process identifier from the cluster state store
    pub process_guid: String,

    /// Container-side port the routes map to
    pub container_port: u16,
}

impl RoutingKey {
    /// Create a new routing key
    #[inline]
    pub fn new(process_guid: impl Into<String>, container_port: u16) -> Self {
        Self {
            process_guid: process_guid.into(),
            container_port,
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process_guid, self.container_port)
    }
}
