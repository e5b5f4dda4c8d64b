//! The routing table - content-addressed (routes, endpoints) store
//!
//! Every mutation computes the minimal register/unregister diff; `swap`
//! atomically replaces the whole table against a snapshot while honoring
//! domain freshness. Ordering inside a diff is deterministic (messages are
//! collected through ordered sets, which groups them by backend address).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use beacon_protocol::{
    ActualLrp, Address, DomainSet, Endpoint, ModificationTag, RegistryMessage, Route, RoutingKey,
    TcpRouteMapping, TcpRouteSpec,
};

use crate::entry::{RouteSet, RoutingTableEntry};
use crate::messages::MessagesToEmit;

/// In-memory diff-computing store of routes and endpoints
///
/// Owned by the handler task; never shared, never locked. Temp tables built
/// for a full sync are ordinary `RoutingTable` values produced by
/// [`SnapshotBuilder`](crate::SnapshotBuilder) and consumed by [`swap`].
///
/// [`swap`]: RoutingTable::swap
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: HashMap<RoutingKey, RoutingTableEntry>,

    /// Table-wide address ownership, for collision detection
    addresses: HashMap<Address, String>,

    /// Collisions observed since construction
    collisions: u64,
}

impl RoutingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of routing keys with live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the route side of `key`'s entry
    ///
    /// Dropped silently when the incoming tag is strictly older than the
    /// stored one. Emits registrations for routes whose value is new to the
    /// key (paired with visible endpoints) and unregistrations for
    /// hostnames that disappeared (paired with every stored endpoint).
    pub fn set_routes(&mut self, key: &RoutingKey, incoming: RouteSet) -> MessagesToEmit {
        let current = self.entries.get(key);
        let stored_tag = current.and_then(|e| e.modification_tag.as_ref());
        if !ModificationTag::accepts(stored_tag, incoming.modification_tag.as_ref()) {
            return MessagesToEmit::default();
        }

        let old_entry = current.cloned().unwrap_or_default();
        let mut new_entry = old_entry.clone();
        new_entry.routes = dedup_routes(incoming.routes);
        new_entry.internal_routes = dedup_routes(incoming.internal_routes);
        new_entry.tcp_routes = dedup_tcp_routes(incoming.tcp_routes);
        new_entry.modification_tag = incoming.modification_tag;

        let messages = route_delta(&old_entry, &new_entry);
        self.store(key, new_entry);
        messages
    }

    /// Remove every route owned by `key`
    ///
    /// Same monotonicity rule as `set_routes`; on success emits
    /// unregistrations for the full Cartesian product and clears the route
    /// side. The entry disappears once both sides are empty.
    pub fn remove_routes(
        &mut self,
        key: &RoutingKey,
        modification_tag: Option<ModificationTag>,
    ) -> MessagesToEmit {
        let Some(current) = self.entries.get(key) else {
            return MessagesToEmit::default();
        };
        if !ModificationTag::accepts(
            current.modification_tag.as_ref(),
            modification_tag.as_ref(),
        ) {
            return MessagesToEmit::default();
        }

        let old_entry = current.clone();
        let mut new_entry = old_entry.clone();
        new_entry.routes.clear();
        new_entry.internal_routes.clear();
        new_entry.tcp_routes.clear();
        new_entry.modification_tag = modification_tag;

        let messages = route_delta(&old_entry, &new_entry);
        self.store(key, new_entry);
        messages
    }

    /// Upsert an endpoint, keyed by (instance, evacuating)
    ///
    /// Emits registrations only when the instance becomes newly visible: an
    /// update to an existing record, or the arrival of a twin for an
    /// instance that is already registered, emits nothing. Detects host:port
    /// collisions across the whole table; both endpoints are retained.
    pub fn add_endpoint(&mut self, key: &RoutingKey, endpoint: Endpoint) -> MessagesToEmit {
        let entry = self.entries.entry(key.clone()).or_default();

        if let Some(existing) = entry.endpoints.get(&endpoint.key()) {
            if !ModificationTag::accepts(
                existing.modification_tag.as_ref(),
                endpoint.modification_tag.as_ref(),
            ) {
                return MessagesToEmit::default();
            }
        }

        let address = endpoint.address();
        if let Some(owner) = self.addresses.get(&address) {
            if *owner != endpoint.instance_guid {
                self.collisions += 1;
                tracing::warn!(
                    host = %address.host,
                    port = address.port,
                    instance_guid_a = %owner,
                    instance_guid_b = %endpoint.instance_guid,
                    "collision-detected-with-endpoint"
                );
            }
        }

        let newly_visible = !entry.has_instance(&endpoint.instance_guid);
        self.addresses
            .insert(address, endpoint.instance_guid.clone());
        entry.endpoints.insert(endpoint.key(), endpoint.clone());

        if !newly_visible {
            return MessagesToEmit::default();
        }

        let mut messages = MessagesToEmit::default();
        for route in &entry.routes {
            messages
                .registrations
                .push(RegistryMessage::for_route(&endpoint, route));
        }
        for route in &entry.internal_routes {
            messages
                .internal_registrations
                .push(RegistryMessage::for_internal_route(&endpoint, route));
        }
        messages
    }

    /// Remove the (instance, evacuating) record matching `endpoint`
    ///
    /// An older-tag removal is a silent no-op. Emits unregistrations only
    /// when no record for the instance remains; while an evacuating twin is
    /// still stored, the instance keeps serving and nothing is emitted.
    pub fn remove_endpoint(&mut self, key: &RoutingKey, endpoint: Endpoint) -> MessagesToEmit {
        let Some(entry) = self.entries.get_mut(key) else {
            return MessagesToEmit::default();
        };
        let Some(stored) = entry.endpoints.get(&endpoint.key()) else {
            return MessagesToEmit::default();
        };
        if !ModificationTag::accepts(
            stored.modification_tag.as_ref(),
            endpoint.modification_tag.as_ref(),
        ) {
            return MessagesToEmit::default();
        }

        let Some(removed) = entry.endpoints.remove(&endpoint.key()) else {
            return MessagesToEmit::default();
        };

        let mut messages = MessagesToEmit::default();
        if !entry.has_instance(&removed.instance_guid) {
            for route in &entry.routes {
                messages
                    .unregistrations
                    .push(RegistryMessage::for_route(&removed, route));
            }
            for route in &entry.internal_routes {
                messages
                    .internal_unregistrations
                    .push(RegistryMessage::for_internal_route(&removed, route));
            }
        }

        if entry.is_empty() {
            self.entries.remove(key);
        }
        self.release_address(&removed);
        messages
    }

    /// Atomically replace the table with a snapshot
    ///
    /// Entries whose endpoints belong to domains missing from
    /// `fresh_domains` are preserved: their unfresh endpoints (and, for
    /// keys with any unfresh endpoint, their routes) are merged into the
    /// incoming table before diffing, so a stale domain can never trigger a
    /// mass unregister. Survivors always re-emit registrations; an
    /// unregistration is emitted only for registry identities that truly
    /// disappeared.
    pub fn swap(&mut self, new_table: RoutingTable, fresh_domains: &DomainSet) -> MessagesToEmit {
        let mut incoming = new_table.entries;

        for (key, old_entry) in &self.entries {
            let has_unfresh = old_entry
                .endpoints
                .values()
                .any(|e| !fresh_domains.contains(&e.domain));
            if !has_unfresh {
                continue;
            }

            let merged = incoming.entry(key.clone()).or_default();
            for endpoint in old_entry.endpoints.values() {
                if !fresh_domains.contains(&endpoint.domain) {
                    merged
                        .endpoints
                        .entry(endpoint.key())
                        .or_insert_with(|| endpoint.clone());
                }
            }
            merge_missing_routes(&mut merged.routes, &old_entry.routes);
            merge_missing_routes(&mut merged.internal_routes, &old_entry.internal_routes);
            merge_missing_tcp_routes(&mut merged.tcp_routes, &old_entry.tcp_routes);
            if merged.modification_tag.is_none() {
                merged.modification_tag = old_entry.modification_tag.clone();
            }
        }

        let old_entries = std::mem::take(&mut self.entries);
        let empty = RoutingTableEntry::default();
        let mut keys: HashSet<RoutingKey> = old_entries.keys().cloned().collect();
        keys.extend(incoming.keys().cloned());

        let mut registrations = BTreeSet::new();
        let mut unregistrations = BTreeSet::new();
        let mut internal_registrations = BTreeSet::new();
        let mut internal_unregistrations = BTreeSet::new();

        for key in keys {
            let old_entry = old_entries.get(&key).unwrap_or(&empty);
            let new_entry = incoming.get(&key).unwrap_or(&empty);

            let new_external = new_entry.external_messages();
            let kept: HashSet<_> = new_external.iter().map(|m| m.identity()).collect();
            for message in old_entry.external_messages() {
                if !kept.contains(&message.identity()) {
                    unregistrations.insert(message);
                }
            }
            registrations.extend(new_external);

            let new_internal = new_entry.internal_messages();
            let kept: HashSet<_> = new_internal.iter().map(|m| m.identity()).collect();
            for message in old_entry.internal_messages() {
                if !kept.contains(&message.identity()) {
                    internal_unregistrations.insert(message);
                }
            }
            internal_registrations.extend(new_internal);
        }

        incoming.retain(|_, entry| !entry.is_empty());
        self.entries = incoming;
        self.rebuild_addresses();

        MessagesToEmit {
            registrations: registrations.into_iter().collect(),
            unregistrations: unregistrations.into_iter().collect(),
            internal_registrations: internal_registrations.into_iter().collect(),
            internal_unregistrations: internal_unregistrations.into_iter().collect(),
        }
    }

    /// The full current registration set (no unregistrations)
    ///
    /// Used by the periodic emit to refresh routers faster than their prune
    /// threshold.
    pub fn messages_to_emit(&self) -> MessagesToEmit {
        let mut registrations = BTreeSet::new();
        let mut internal_registrations = BTreeSet::new();
        for entry in self.entries.values() {
            registrations.extend(entry.external_messages());
            internal_registrations.extend(entry.internal_messages());
        }
        MessagesToEmit {
            registrations: registrations.into_iter().collect(),
            internal_registrations: internal_registrations.into_iter().collect(),
            ..Default::default()
        }
    }

    /// The full current TCP mapping set, stamped with the given TTL
    pub fn tcp_mappings(&self, ttl: Duration) -> Vec<TcpRouteMapping> {
        let mut mappings = BTreeSet::new();
        for entry in self.entries.values() {
            for spec in &entry.tcp_routes {
                for endpoint in entry.visible_endpoints() {
                    mappings.insert(TcpRouteMapping {
                        external_port: spec.external_port,
                        host: endpoint.host.clone(),
                        port: endpoint.port,
                        ttl_seconds: ttl.as_secs(),
                        modification_tag: entry.modification_tag.clone(),
                    });
                }
            }
        }
        mappings.into_iter().collect()
    }

    /// Σ over keys of |routes| × min(1, non-evacuating instances)
    ///
    /// An entry with only routes or only endpoints contributes zero.
    pub fn route_count(&self) -> usize {
        self.entries
            .values()
            .map(|e| e.routes.len() * e.running_instance_count().min(1))
            .sum()
    }

    /// Total (route, endpoint) associations across the table
    pub fn http_associations_count(&self) -> u64 {
        self.entries
            .values()
            .map(|e| (e.routes.len() * e.endpoints.len()) as u64)
            .sum()
    }

    /// Total (tcp route, endpoint) associations across the table
    pub fn tcp_associations_count(&self) -> u64 {
        self.entries
            .values()
            .map(|e| (e.tcp_routes.len() * e.endpoints.len()) as u64)
            .sum()
    }

    /// Host:port collisions observed since construction
    pub fn collision_count(&self) -> u64 {
        self.collisions
    }

    /// Whether any of the actual's routing keys currently owns external routes
    ///
    /// The watcher uses this to decide when an endpoint event must be
    /// preceded by a desired-state refresh.
    pub fn has_external_routes(&self, actual: &ActualLrp) -> bool {
        actual.ports.iter().any(|mapping| {
            self.entries
                .get(&RoutingKey::new(
                    &actual.process_guid,
                    mapping.container_port,
                ))
                .is_some_and(|entry| !entry.routes.is_empty())
        })
    }

    fn store(&mut self, key: &RoutingKey, entry: RoutingTableEntry) {
        if entry.is_empty() {
            self.entries.remove(key);
        } else {
            self.entries.insert(key.clone(), entry);
        }
    }

    /// Drop the address mapping once nothing in the table serves on it
    fn release_address(&mut self, removed: &Endpoint) {
        let address = removed.address();
        let still_in_use = self
            .entries
            .values()
            .any(|entry| entry.endpoints.values().any(|e| e.address() == address));
        if !still_in_use {
            self.addresses.remove(&address);
        }
    }

    fn rebuild_addresses(&mut self) {
        self.addresses.clear();
        for entry in self.entries.values() {
            for endpoint in entry.endpoints.values() {
                self.addresses
                    .insert(endpoint.address(), endpoint.instance_guid.clone());
            }
        }
    }
}

/// Diff two versions of one entry after a route-side change
///
/// Registrations cover routes whose full value is new (the route-service
/// URL is part of a route's identity, so a URL change re-registers every
/// pairing); unregistrations cover hostnames that disappeared.
fn route_delta(old: &RoutingTableEntry, new: &RoutingTableEntry) -> MessagesToEmit {
    let visible = new.visible_endpoints();

    let mut registrations = BTreeSet::new();
    for route in &new.routes {
        if !old.routes.contains(route) {
            for endpoint in &visible {
                registrations.insert(RegistryMessage::for_route(endpoint, route));
            }
        }
    }
    let mut internal_registrations = BTreeSet::new();
    for route in &new.internal_routes {
        if !old.internal_routes.contains(route) {
            for endpoint in &visible {
                internal_registrations.insert(RegistryMessage::for_internal_route(endpoint, route));
            }
        }
    }

    let kept: HashSet<&str> = new.routes.iter().map(|r| r.hostname.as_str()).collect();
    let mut unregistrations = BTreeSet::new();
    for route in &old.routes {
        if !kept.contains(route.hostname.as_str()) {
            for endpoint in old.endpoints.values() {
                unregistrations.insert(RegistryMessage::for_route(endpoint, route));
            }
        }
    }
    let kept: HashSet<&str> = new
        .internal_routes
        .iter()
        .map(|r| r.hostname.as_str())
        .collect();
    let mut internal_unregistrations = BTreeSet::new();
    for route in &old.internal_routes {
        if !kept.contains(route.hostname.as_str()) {
            for endpoint in old.endpoints.values() {
                internal_unregistrations.insert(RegistryMessage::for_internal_route(endpoint, route));
            }
        }
    }

    MessagesToEmit {
        registrations: registrations.into_iter().collect(),
        unregistrations: unregistrations.into_iter().collect(),
        internal_registrations: internal_registrations.into_iter().collect(),
        internal_unregistrations: internal_unregistrations.into_iter().collect(),
    }
}

/// Collapse duplicate hostnames, keeping the first occurrence
fn dedup_routes(routes: Vec<Route>) -> Vec<Route> {
    let mut seen = HashSet::new();
    routes
        .into_iter()
        .filter(|route| seen.insert(route.hostname.clone()))
        .collect()
}

fn dedup_tcp_routes(routes: Vec<TcpRouteSpec>) -> Vec<TcpRouteSpec> {
    let mut seen = HashSet::new();
    routes
        .into_iter()
        .filter(|spec| seen.insert(spec.external_port))
        .collect()
}

fn merge_missing_routes(target: &mut Vec<Route>, preserved: &[Route]) {
    let kept: HashSet<String> = target.iter().map(|r| r.hostname.clone()).collect();
    for route in preserved {
        if !kept.contains(&route.hostname) {
            target.push(route.clone());
        }
    }
}

fn merge_missing_tcp_routes(target: &mut Vec<TcpRouteSpec>, preserved: &[TcpRouteSpec]) {
    let kept: HashSet<u16> = target.iter().map(|s| s.external_port).collect();
    for spec in preserved {
        if !kept.contains(&spec.external_port) {
            target.push(*spec);
        }
    }
}
