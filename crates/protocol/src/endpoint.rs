//! Endpoints - concrete backends for a routing key

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModificationTag;

/// A backend instance's network address plus identity metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Instance identifier from the cluster state store
    pub instance_guid: String,

    /// Host address routable from the routers
    pub host: String,

    /// Instance index within the workload
    pub index: u32,

    /// Cluster domain the instance was reported under
    pub domain: String,

    /// Host-side port the router connects to
    pub port: u16,

    /// Container-side port, used for container-to-container routes
    pub container_port: u16,

    /// Whether this instance is being drained
    ///
    /// An evacuating endpoint coexists briefly with its replacement; the
    /// routing table keys endpoints by (instance, evacuating) so both can
    /// be held at once.
    pub evacuating: bool,

    /// Version stamp for monotonic updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_tag: Option<ModificationTag>,
}

impl Endpoint {
    /// The storage key for this endpoint within a routing-table entry
    #[inline]
    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            instance_guid: self.instance_guid.clone(),
            evacuating: self.evacuating,
        }
    }

    /// The network address this endpoint serves on
    #[inline]
    pub fn address(&self) -> Address {
        Address {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Storage key for endpoints: an instance and its evacuating twin are
/// distinct slots
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    pub instance_guid: String,
    pub evacuating: bool,
}

/// A host:port pair
///
/// Used for collision detection: two distinct instances sharing an address
/// is a collision, logged but tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
