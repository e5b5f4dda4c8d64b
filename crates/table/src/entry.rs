//! Per-routing-key table entries

use std::collections::{BTreeSet, HashMap};

use beacon_protocol::{Endpoint, EndpointKey, ModificationTag, RegistryMessage, Route, TcpRouteSpec};

/// The route side of a routing-table mutation
///
/// Carried by `SetRoutes`: the complete set of routes a key should own from
/// now on, plus the tag gating the replacement. An absent tag always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSet {
    /// External hostname routes
    pub routes: Vec<Route>,

    /// Container-to-container routes
    pub internal_routes: Vec<Route>,

    /// TCP router port declarations
    pub tcp_routes: Vec<TcpRouteSpec>,

    pub modification_tag: Option<ModificationTag>,
}

impl RouteSet {
    /// A route set with only external routes
    pub fn external(routes: Vec<Route>, modification_tag: Option<ModificationTag>) -> Self {
        Self {
            routes,
            modification_tag,
            ..Default::default()
        }
    }
}

/// The invariant-bearing unit the table stores per routing key
///
/// Endpoints are keyed by (instance, evacuating) so an instance and its
/// evacuating twin may coexist transiently. The active registrations of an
/// entry are the Cartesian product of its routes and its *visible*
/// endpoints: per instance, the non-evacuating record, or the evacuating
/// one when no non-evacuating twin exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTableEntry {
    pub routes: Vec<Route>,
    pub internal_routes: Vec<Route>,
    pub tcp_routes: Vec<TcpRouteSpec>,
    pub endpoints: HashMap<EndpointKey, Endpoint>,
    pub modification_tag: Option<ModificationTag>,
}

impl RoutingTableEntry {
    /// Whether the entry holds nothing worth keeping
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
            && self.internal_routes.is_empty()
            && self.tcp_routes.is_empty()
            && self.endpoints.is_empty()
    }

    /// Whether any record (evacuating or not) exists for the instance
    pub fn has_instance(&self, instance_guid: &str) -> bool {
        self.endpoints
            .keys()
            .any(|k| k.instance_guid == instance_guid)
    }

    /// Number of non-evacuating endpoint records
    pub fn running_instance_count(&self) -> usize {
        self.endpoints.keys().filter(|k| !k.evacuating).count()
    }

    /// Endpoints that should appear in registrations
    ///
    /// Per instance: the non-evacuating record, or the evacuating one when
    /// it is the only record left.
    pub fn visible_endpoints(&self) -> Vec<&Endpoint> {
        self.endpoints
            .values()
            .filter(|endpoint| {
                !endpoint.evacuating
                    || !self.endpoints.contains_key(&EndpointKey {
                        instance_guid: endpoint.instance_guid.clone(),
                        evacuating: false,
                    })
            })
            .collect()
    }

    /// The full external registration set for this entry
    pub fn external_messages(&self) -> BTreeSet<RegistryMessage> {
        let mut messages = BTreeSet::new();
        for endpoint in self.visible_endpoints() {
            for route in &self.routes {
                messages.insert(RegistryMessage::for_route(endpoint, route));
            }
        }
        messages
    }

    /// The full internal registration set for this entry
    pub fn internal_messages(&self) -> BTreeSet<RegistryMessage> {
        let mut messages = BTreeSet::new();
        for endpoint in self.visible_endpoints() {
            for route in &self.internal_routes {
                messages.insert(RegistryMessage::for_internal_route(endpoint, route));
            }
        }
        messages
    }
}
