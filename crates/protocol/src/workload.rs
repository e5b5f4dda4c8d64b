//! Cluster workload model - desired and actual state
//!
//! These mirror what the cluster state store reports: desired workloads are
//! the source of routes, actual instances the source of endpoints. The
//! watcher translates `Event` values into routing-table mutations.

use serde::{Deserialize, Serialize};

use crate::ModificationTag;

/// A desired workload definition - the source of routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredLrp {
    /// Process identifier; combined with each route group's container port
    /// this forms the routing keys the workload owns
    pub process_guid: String,

    /// Log identifier forwarded with every route
    pub log_guid: String,

    /// Route declarations, one group per container port
    #[serde(default)]
    pub routes: Vec<DesiredRoutes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_tag: Option<ModificationTag>,
}

/// Route declarations for one container port of a desired workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRoutes {
    /// Container port these routes map to
    pub container_port: u16,

    /// External hostnames
    #[serde(default)]
    pub hostnames: Vec<String>,

    /// Hostnames resolved container-to-container
    #[serde(default)]
    pub internal_hostnames: Vec<String>,

    /// External TCP ports on the TCP router
    #[serde(default)]
    pub external_tcp_ports: Vec<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_segment: Option<String>,
}

/// Lifecycle state of an actual instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

/// A container-to-host port mapping on an actual instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// An observed running instance - the source of endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualLrp {
    pub process_guid: String,
    pub instance_guid: String,
    pub index: u32,

    /// Cluster domain the instance was reported under
    pub domain: String,

    pub state: InstanceState,

    /// Host address the instance's ports are published on
    pub host: String,

    #[serde(default)]
    pub ports: Vec<PortMapping>,

    /// Whether this instance is being drained
    #[serde(default)]
    pub evacuating: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_tag: Option<ModificationTag>,
}

impl ActualLrp {
    /// Whether the instance is serving traffic
    #[inline]
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }
}

/// A state-store event as delivered by the event stream
///
/// Unrecognized kinds deserialize into `Unknown` so the handler can log and
/// drop them instead of tearing down the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    DesiredCreated {
        desired: DesiredLrp,
    },
    DesiredChanged {
        before: DesiredLrp,
        after: DesiredLrp,
    },
    DesiredRemoved {
        desired: DesiredLrp,
    },
    ActualCreated {
        actual: ActualLrp,
    },
    ActualChanged {
        before: ActualLrp,
        after: ActualLrp,
    },
    ActualRemoved {
        actual: ActualLrp,
    },
    #[serde(other)]
    Unknown,
}

impl Event {
    /// Event kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DesiredCreated { .. } => "desired_created",
            Event::DesiredChanged { .. } => "desired_changed",
            Event::DesiredRemoved { .. } => "desired_removed",
            Event::ActualCreated { .. } => "actual_created",
            Event::ActualChanged { .. } => "actual_changed",
            Event::ActualRemoved { .. } => "actual_removed",
            Event::Unknown => "unknown",
        }
    }
}
