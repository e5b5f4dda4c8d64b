//! Tests for RoutingTable
//!
//! Covers the diff contracts of every mutation, evacuating-twin visibility,
//! modification-tag monotonicity, collision detection, swap semantics with
//! domain freshness, and the derived counts.

use std::time::Duration;

use beacon_protocol::{
    DomainSet, Endpoint, ModificationTag, RegistryMessage, Route, RoutingKey, TcpRouteSpec,
};

use crate::{MessagesToEmit, RouteSet, RoutingTable, SnapshotBuilder};

const LOG_GUID: &str = "some-log-guid";
const DOMAIN: &str = "domain";

fn key() -> RoutingKey {
    RoutingKey::new("some-process-guid", 8080)
}

fn tag(epoch: &str, index: u64) -> ModificationTag {
    ModificationTag::new(epoch, index)
}

fn current_tag() -> Option<ModificationTag> {
    Some(tag("abc", 1))
}

fn route(hostname: &str) -> Route {
    Route::new(hostname, LOG_GUID)
}

fn route_with_url(hostname: &str, url: &str) -> Route {
    route(hostname).with_route_service_url(url)
}

fn endpoint(instance_guid: &str, host: &str, index: u32, port: u16) -> Endpoint {
    Endpoint {
        instance_guid: instance_guid.to_string(),
        host: host.to_string(),
        index,
        domain: DOMAIN.to_string(),
        port,
        container_port: 8080,
        evacuating: false,
        modification_tag: current_tag(),
    }
}

fn endpoint1() -> Endpoint {
    endpoint("ig-1", "1.1.1.1", 0, 11)
}

fn endpoint2() -> Endpoint {
    endpoint("ig-2", "2.2.2.2", 1, 22)
}

fn endpoint3() -> Endpoint {
    endpoint("ig-3", "3.3.3.3", 2, 33)
}

fn evacuating1() -> Endpoint {
    Endpoint {
        evacuating: true,
        ..endpoint1()
    }
}

fn collision_endpoint() -> Endpoint {
    endpoint("ig-4", "1.1.1.1", 3, 11)
}

fn replacement_after_evacuation() -> Endpoint {
    endpoint("ig-5", "5.5.5.5", 0, 55)
}

fn reg(endpoint: &Endpoint, route: &Route) -> RegistryMessage {
    RegistryMessage::for_route(endpoint, route)
}

fn external(routes: Vec<Route>, modification_tag: Option<ModificationTag>) -> RouteSet {
    RouteSet::external(routes, modification_tag)
}

fn fresh_domains() -> DomainSet {
    [DOMAIN].into_iter().collect()
}

fn no_fresh_domains() -> DomainSet {
    DomainSet::new()
}

fn snapshot(
    routes: Vec<(RoutingKey, RouteSet)>,
    endpoints: Vec<(RoutingKey, Endpoint)>,
) -> RoutingTable {
    let mut builder = SnapshotBuilder::new();
    for (key, set) in routes {
        builder.set_routes(&key, set);
    }
    for (key, endpoint) in endpoints {
        builder.add_endpoint(&key, endpoint);
    }
    builder.build()
}

fn sorted(mut messages: Vec<RegistryMessage>) -> Vec<RegistryMessage> {
    messages.sort();
    messages
}

/// Compare the external halves of a diff as multisets
fn assert_diff(
    actual: &MessagesToEmit,
    registrations: Vec<RegistryMessage>,
    unregistrations: Vec<RegistryMessage>,
) {
    assert_eq!(
        sorted(actual.registrations.clone()),
        sorted(registrations),
        "registrations mismatch"
    );
    assert_eq!(
        sorted(actual.unregistrations.clone()),
        sorted(unregistrations),
        "unregistrations mismatch"
    );
}

// =============================================================================
// Evacuation
// =============================================================================

#[test]
fn test_evacuation_handover() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");

    let messages = table.set_routes(&key(), external(vec![h1.clone()], current_tag()));
    assert!(messages.is_empty());

    let messages = table.add_endpoint(&key(), endpoint1());
    assert_diff(&messages, vec![reg(&endpoint1(), &h1)], vec![]);

    // the evacuating twin arrives: the instance is already registered
    let messages = table.add_endpoint(&key(), evacuating1());
    assert!(messages.is_empty());
    assert_eq!(table.collision_count(), 0);

    // the instance record goes away, the twin still serves
    let messages = table.remove_endpoint(&key(), endpoint1());
    assert!(messages.is_empty());

    let messages = table.add_endpoint(&key(), replacement_after_evacuation());
    assert_diff(
        &messages,
        vec![reg(&replacement_after_evacuation(), &h1)],
        vec![],
    );

    // the twin drains out last
    let messages = table.remove_endpoint(&key(), evacuating1());
    assert_diff(&messages, vec![], vec![reg(&evacuating1(), &h1)]);
}

// =============================================================================
// Swap
// =============================================================================

#[test]
fn test_swap_new_key_emits_all_pairings() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    let messages = table.swap(temp, &fresh_domains());

    assert_diff(
        &messages,
        vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ],
        vec![],
    );
}

#[test]
fn test_swap_key_with_only_routes_emits_nothing() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");

    let temp = snapshot(vec![(key(), external(vec![h1.clone()], None))], vec![]);
    assert!(table.swap(temp, &fresh_domains()).is_empty());

    // endpoints subsequently arrive
    let temp = snapshot(
        vec![(key(), external(vec![h1.clone()], None))],
        vec![(key(), endpoint1())],
    );
    let messages = table.swap(temp, &fresh_domains());
    assert_diff(&messages, vec![reg(&endpoint1(), &h1)], vec![]);

    // and the key disappears entirely
    let messages = table.swap(snapshot(vec![], vec![]), &fresh_domains());
    assert_diff(&messages, vec![], vec![reg(&endpoint1(), &h1)]);
}

#[test]
fn test_swap_key_with_only_endpoints_emits_nothing() {
    let mut table = RoutingTable::new();

    let temp = snapshot(vec![], vec![(key(), endpoint1())]);
    assert!(table.swap(temp, &fresh_domains()).is_empty());

    // routes subsequently arrive
    let h1 = route("foo.example.com");
    let temp = snapshot(
        vec![(key(), external(vec![h1.clone()], None))],
        vec![(key(), endpoint1())],
    );
    let messages = table.swap(temp, &fresh_domains());
    assert_diff(&messages, vec![reg(&endpoint1(), &h1)], vec![]);
}

#[test]
fn test_swap_unchanged_is_idempotent() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");
    let make = || {
        snapshot(
            vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
            vec![(key(), endpoint1()), (key(), endpoint2())],
        )
    };

    let first = table.swap(make(), &fresh_domains());
    let second = table.swap(make(), &fresh_domains());

    assert_eq!(
        sorted(first.registrations),
        sorted(second.registrations.clone())
    );
    assert_diff(
        &second,
        vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ],
        vec![],
    );
}

#[test]
fn test_swap_route_service_url_change_reregisters_without_unregistering() {
    let mut table = RoutingTable::new();
    let old_routes = vec![
        route_with_url("foo.example.com", "https://rs.example.com"),
        route_with_url("bar.example.com", "https://rs.example.com"),
    ];
    let new_routes = vec![
        route_with_url("foo.example.com", "https://rs.new.example.com"),
        route_with_url("bar.example.com", "https://rs.new.example.com"),
    ];

    let temp = snapshot(
        vec![(key(), external(old_routes, None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    table.swap(temp, &fresh_domains());

    let temp = snapshot(
        vec![(key(), external(new_routes.clone(), None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    let messages = table.swap(temp, &fresh_domains());

    assert_diff(
        &messages,
        vec![
            reg(&endpoint1(), &new_routes[0]),
            reg(&endpoint1(), &new_routes[1]),
            reg(&endpoint2(), &new_routes[0]),
            reg(&endpoint2(), &new_routes[1]),
        ],
        vec![],
    );
}

#[test]
fn test_swap_gains_and_loses_reflected_in_diff() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");
    let h3 = route("baz.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    table.swap(temp, &fresh_domains());

    // gains a route and loses an endpoint at once
    let temp = snapshot(
        vec![(
            key(),
            external(vec![h1.clone(), h2.clone(), h3.clone()], None),
        )],
        vec![(key(), endpoint1())],
    );
    let messages = table.swap(temp, &fresh_domains());

    assert_diff(
        &messages,
        vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint1(), &h3),
        ],
        vec![reg(&endpoint2(), &h1), reg(&endpoint2(), &h2)],
    );
}

#[test]
fn test_swap_loses_both_routes_and_endpoints() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    table.swap(temp, &fresh_domains());

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone()], None))],
        vec![(key(), endpoint1())],
    );
    let messages = table.swap(temp, &fresh_domains());

    assert_diff(
        &messages,
        vec![reg(&endpoint1(), &h1)],
        vec![
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ],
    );
}

#[test]
fn test_swap_evacuating_twin_covers_removed_instance() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");
    let routes = || external(vec![h1.clone(), h2.clone()], None);

    let temp = snapshot(
        vec![(key(), routes())],
        vec![
            (key(), endpoint1()),
            (key(), endpoint2()),
            (key(), evacuating1()),
        ],
    );
    table.swap(temp, &fresh_domains());

    // the non-evacuating record for ig-1 disappears; its twin still serves
    // on the same address, so nothing is unregistered
    let temp = snapshot(
        vec![(key(), routes())],
        vec![(key(), endpoint2()), (key(), evacuating1())],
    );
    let messages = table.swap(temp, &fresh_domains());

    assert_diff(
        &messages,
        vec![
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
            reg(&evacuating1(), &h1),
            reg(&evacuating1(), &h2),
        ],
        vec![],
    );
}

#[test]
fn test_swap_missing_key_fresh_domain_unregisters() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    table.swap(temp, &fresh_domains());

    let messages = table.swap(snapshot(vec![], vec![]), &fresh_domains());
    assert_diff(
        &messages,
        vec![],
        vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ],
    );
    assert_eq!(table.route_count(), 0);
}

#[test]
fn test_swap_missing_key_stale_domain_preserves_entry() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![(key(), endpoint1()), (key(), endpoint2())],
    );
    table.swap(temp, &fresh_domains());

    // the state store did not vouch for the domain: keep everything and
    // keep re-registering it
    let expected = vec![
        reg(&endpoint1(), &h1),
        reg(&endpoint1(), &h2),
        reg(&endpoint2(), &h1),
        reg(&endpoint2(), &h2),
    ];
    let messages = table.swap(snapshot(vec![], vec![]), &no_fresh_domains());
    assert_diff(&messages, expected.clone(), vec![]);

    // repeatedly not fresh: the preserved entry is still intact
    let messages = table.swap(snapshot(vec![], vec![]), &no_fresh_domains());
    assert_diff(&messages, expected, vec![]);

    // collisions are still detected against the preserved endpoints
    table.add_endpoint(&key(), collision_endpoint());
    assert_eq!(table.collision_count(), 1);
}

#[test]
fn test_swap_stale_domain_merges_old_routes() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");
    let h3 = route("baz.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![(key(), endpoint1())],
    );
    table.swap(temp, &fresh_domains());

    // not fresh: the scan lost h2, so it is carried over
    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h3.clone()], None))],
        vec![(key(), endpoint1())],
    );
    let messages = table.swap(temp, &no_fresh_domains());
    assert_diff(
        &messages,
        vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint1(), &h3),
        ],
        vec![],
    );

    // once the domain is fresh again, the scan is authoritative
    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h3.clone()], None))],
        vec![(key(), endpoint1())],
    );
    let messages = table.swap(temp, &fresh_domains());
    assert_diff(
        &messages,
        vec![reg(&endpoint1(), &h1), reg(&endpoint1(), &h3)],
        vec![reg(&endpoint1(), &h2)],
    );
}

#[test]
fn test_swap_pairless_entries_emit_nothing() {
    // routes that never had endpoints
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");

    let temp = snapshot(
        vec![(key(), external(vec![h1.clone(), h2.clone()], None))],
        vec![],
    );
    table.swap(temp, &fresh_domains());
    let temp = snapshot(vec![(key(), external(vec![h1.clone()], None))], vec![]);
    assert!(table.swap(temp, &fresh_domains()).is_empty());

    // endpoints that never had routes
    let mut table = RoutingTable::new();
    let temp = snapshot(vec![], vec![(key(), endpoint1()), (key(), endpoint2())]);
    table.swap(temp, &fresh_domains());
    let temp = snapshot(vec![], vec![(key(), endpoint1())]);
    assert!(table.swap(temp, &fresh_domains()).is_empty());
}

// =============================================================================
// Deltas: SetRoutes
// =============================================================================

#[test]
fn test_ops_on_empty_table_emit_nothing() {
    let mut table = RoutingTable::new();

    assert!(table
        .set_routes(
            &key(),
            external(vec![route("foo.example.com")], current_tag())
        )
        .is_empty());

    let mut table = RoutingTable::new();
    assert!(table.remove_routes(&key(), current_tag()).is_empty());
    assert!(table.add_endpoint(&key(), endpoint1()).is_empty());
    assert!(table.remove_endpoint(&key(), endpoint1()).is_empty());
}

fn populated_table() -> (RoutingTable, Route, Route) {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");
    table.set_routes(&key(), external(vec![h1.clone(), h2.clone()], current_tag()));
    table.add_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint2());
    (table, h1, h2)
}

#[test]
fn test_set_routes_unchanged_hostnames_emits_nothing() {
    let (mut table, h1, h2) = populated_table();
    let messages = table.set_routes(&key(), external(vec![h1, h2], Some(tag("def", 0))));
    assert!(messages.is_empty());
}

#[test]
fn test_set_routes_url_change_reregisters_every_pairing() {
    let (mut table, _, _) = populated_table();
    let with_url = vec![
        route_with_url("foo.example.com", "https://rs.example.com"),
        route_with_url("bar.example.com", "https://rs.example.com"),
    ];

    let messages = table.set_routes(&key(), external(with_url.clone(), Some(tag("def", 0))));
    assert_diff(
        &messages,
        vec![
            reg(&endpoint1(), &with_url[0]),
            reg(&endpoint1(), &with_url[1]),
            reg(&endpoint2(), &with_url[0]),
            reg(&endpoint2(), &with_url[1]),
        ],
        vec![],
    );
}

#[test]
fn test_set_routes_older_tag_is_dropped() {
    let (mut table, h1, h2) = populated_table();
    let h3 = route("baz.example.com");

    let messages = table.set_routes(
        &key(),
        external(vec![h1.clone(), h2.clone(), h3], Some(tag("abc", 0))),
    );
    assert!(messages.is_empty());

    // the stored routes are untouched
    let current = table.messages_to_emit();
    assert_eq!(current.registrations.len(), 4);
}

#[test]
fn test_set_routes_added_hostname_registers_against_all_endpoints() {
    let (mut table, h1, h2) = populated_table();
    let h3 = route("baz.example.com");

    let messages = table.set_routes(
        &key(),
        external(vec![h1, h2, h3.clone()], Some(tag("def", 0))),
    );
    assert_diff(
        &messages,
        vec![reg(&endpoint1(), &h3), reg(&endpoint2(), &h3)],
        vec![],
    );
}

#[test]
fn test_set_routes_removed_hostname_unregisters_against_all_endpoints() {
    let (mut table, h1, h2) = populated_table();

    let messages = table.set_routes(&key(), external(vec![h1], Some(tag("def", 0))));
    assert_diff(
        &messages,
        vec![],
        vec![reg(&endpoint1(), &h2), reg(&endpoint2(), &h2)],
    );
}

#[test]
fn test_set_routes_add_and_remove_in_one_call() {
    let (mut table, h1, h2) = populated_table();
    let h3 = route("baz.example.com");

    let messages = table.set_routes(&key(), external(vec![h1, h3.clone()], Some(tag("def", 0))));
    assert_diff(
        &messages,
        vec![reg(&endpoint1(), &h3), reg(&endpoint2(), &h3)],
        vec![reg(&endpoint1(), &h2), reg(&endpoint2(), &h2)],
    );
}

#[test]
fn test_set_routes_collapses_duplicate_hostnames() {
    let mut table = RoutingTable::new();
    table.add_endpoint(&key(), endpoint1());

    let h1 = route("foo.example.com");
    let messages = table.set_routes(&key(), external(vec![h1.clone(), h1.clone()], current_tag()));
    assert_diff(&messages, vec![reg(&endpoint1(), &h1)], vec![]);
    assert_eq!(table.messages_to_emit().registrations.len(), 1);
}

#[test]
fn test_set_routes_with_only_endpoints_registers() {
    let mut table = RoutingTable::new();
    table.add_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint2());

    let with_url = vec![
        route_with_url("foo.example.com", "https://rs.example.com"),
        route_with_url("bar.example.com", "https://rs.example.com"),
    ];
    let messages = table.set_routes(&key(), external(with_url.clone(), current_tag()));
    assert_diff(
        &messages,
        vec![
            reg(&endpoint1(), &with_url[0]),
            reg(&endpoint1(), &with_url[1]),
            reg(&endpoint2(), &with_url[0]),
            reg(&endpoint2(), &with_url[1]),
        ],
        vec![],
    );
}

#[test]
fn test_set_routes_with_only_routes_emits_nothing() {
    let mut table = RoutingTable::new();
    table.set_routes(
        &key(),
        external(vec![route("foo.example.com")], current_tag()),
    );

    let messages = table.set_routes(
        &key(),
        external(vec![route("baz.example.com")], Some(tag("def", 0))),
    );
    assert!(messages.is_empty());
}

// =============================================================================
// Deltas: RemoveRoutes
// =============================================================================

#[test]
fn test_remove_routes_older_tag_is_a_silent_noop() {
    let (mut table, _, _) = populated_table();
    let before = table.route_count();

    let messages = table.remove_routes(&key(), Some(tag("abc", 0)));
    assert!(messages.is_empty());
    assert_eq!(table.route_count(), before);
}

#[test]
fn test_remove_routes_equal_tag_unregisters_everything() {
    let (mut table, h1, h2) = populated_table();

    let messages = table.remove_routes(&key(), current_tag());
    assert_diff(
        &messages,
        vec![],
        vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ],
    );
    assert_eq!(table.route_count(), 0);
}

#[test]
fn test_remove_routes_newer_tag_unregisters_everything() {
    let (mut table, _, _) = populated_table();

    let messages = table.remove_routes(&key(), Some(tag("def", 0)));
    assert_eq!(messages.unregistrations.len(), 4);
    assert_eq!(table.route_count(), 0);
}

// =============================================================================
// Deltas: AddEndpoint / RemoveEndpoint
// =============================================================================

#[test]
fn test_add_endpoint_updates_emit_nothing() {
    let (mut table, _, _) = populated_table();

    // same tag
    assert!(table.add_endpoint(&key(), endpoint1()).is_empty());

    // older tag
    let older = Endpoint {
        modification_tag: Some(tag("abc", 0)),
        ..endpoint1()
    };
    assert!(table.add_endpoint(&key(), older).is_empty());

    // newer tag
    let newer = Endpoint {
        modification_tag: Some(tag("def", 0)),
        ..endpoint1()
    };
    assert!(table.add_endpoint(&key(), newer).is_empty());
}

#[test]
fn test_add_endpoint_new_instance_registers_against_all_routes() {
    let (mut table, h1, h2) = populated_table();

    let messages = table.add_endpoint(&key(), endpoint3());
    assert_diff(
        &messages,
        vec![reg(&endpoint3(), &h1), reg(&endpoint3(), &h2)],
        vec![],
    );
    assert_eq!(table.collision_count(), 0);
}

#[test]
fn test_add_endpoint_collision_is_logged_and_both_retained() {
    let (mut table, _, _) = populated_table();

    let messages = table.add_endpoint(&key(), collision_endpoint());
    assert_eq!(table.collision_count(), 1);
    // ig-4 is newly visible, so it still registers
    assert_eq!(messages.registrations.len(), 2);
    // both instances remain stored
    assert_eq!(table.http_associations_count(), 2 * 3);
}

#[test]
fn test_no_collision_after_endpoint_removed() {
    let (mut table, _, _) = populated_table();

    table.remove_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), collision_endpoint());
    assert_eq!(table.collision_count(), 0);
}

#[test]
fn test_remove_endpoint_unregisters_against_all_routes() {
    let (mut table, h1, h2) = populated_table();

    let messages = table.remove_endpoint(&key(), endpoint2());
    assert_diff(
        &messages,
        vec![],
        vec![reg(&endpoint2(), &h1), reg(&endpoint2(), &h2)],
    );
}

#[test]
fn test_remove_endpoint_newer_tag_unregisters() {
    let (mut table, _, _) = populated_table();

    let newer = Endpoint {
        modification_tag: Some(tag("def", 0)),
        ..endpoint2()
    };
    let messages = table.remove_endpoint(&key(), newer);
    assert_eq!(messages.unregistrations.len(), 2);
}

#[test]
fn test_remove_endpoint_older_tag_is_a_silent_noop() {
    let (mut table, _, _) = populated_table();

    let older = Endpoint {
        modification_tag: Some(tag("abc", 0)),
        ..endpoint2()
    };
    assert!(table.remove_endpoint(&key(), older).is_empty());
    assert_eq!(table.http_associations_count(), 2 * 2);
}

#[test]
fn test_remove_endpoint_with_evacuating_twin_emits_nothing() {
    let (mut table, _, _) = populated_table();
    table.add_endpoint(&key(), evacuating1());

    assert!(table.remove_endpoint(&key(), endpoint1()).is_empty());
}

// =============================================================================
// Full table emission
// =============================================================================

#[test]
fn test_messages_to_emit_requires_pairings() {
    let table = RoutingTable::new();
    assert!(table.messages_to_emit().is_empty());

    // routes only
    let mut table = RoutingTable::new();
    table.set_routes(
        &key(),
        external(
            vec![route("foo.example.com"), route("bar.example.com")],
            None,
        ),
    );
    assert!(table.messages_to_emit().is_empty());

    // endpoints only
    let mut table = RoutingTable::new();
    table.add_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint2());
    assert!(table.messages_to_emit().is_empty());
}

#[test]
fn test_messages_to_emit_is_the_full_cartesian_product() {
    let (table, h1, h2) = populated_table();

    let messages = table.messages_to_emit();
    assert_eq!(
        sorted(messages.registrations),
        sorted(vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ])
    );
    assert!(messages.unregistrations.is_empty());
}

#[test]
fn test_visible_endpoints_prefer_non_evacuating_records() {
    let (mut table, h1, h2) = populated_table();
    table.add_endpoint(&key(), evacuating1());

    // ig-1's twin shares its address, so the full set is unchanged
    let messages = table.messages_to_emit();
    assert_eq!(
        sorted(messages.registrations),
        sorted(vec![
            reg(&endpoint1(), &h1),
            reg(&endpoint1(), &h2),
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
        ])
    );

    // once the instance record is gone, the evacuating twin is visible
    table.remove_endpoint(&key(), endpoint1());
    let messages = table.messages_to_emit();
    assert_eq!(messages.registrations.len(), 4);
}

// =============================================================================
// Counts
// =============================================================================

#[test]
fn test_route_count_on_a_new_table_is_zero() {
    assert_eq!(RoutingTable::new().route_count(), 0);
}

#[test]
fn test_route_count_counts_routes_with_running_instances() {
    let mut table = RoutingTable::new();
    let key_a = RoutingKey::new("pg-a", 8080);
    let key_b = RoutingKey::new("pg-b", 8080);

    table.set_routes(
        &key_a,
        external(vec![route("a1.example.com"), route("a2.example.com")], None),
    );
    table.add_endpoint(&key_a, endpoint1());
    table.add_endpoint(&key_a, endpoint2());

    table.set_routes(
        &key_b,
        external(vec![route("b1.example.com"), route("b2.example.com")], None),
    );
    table.add_endpoint(&key_b, endpoint3());

    // per key: |routes| x min(1, non-evacuating instances)
    assert_eq!(table.route_count(), 4);
}

#[test]
fn test_route_count_ignores_evacuating_only_entries() {
    let mut table = RoutingTable::new();
    table.set_routes(&key(), external(vec![route("foo.example.com")], None));
    table.add_endpoint(&key(), evacuating1());

    assert_eq!(table.route_count(), 0);
    // the evacuating endpoint still carries registrations
    assert_eq!(table.messages_to_emit().registrations.len(), 1);
}

#[test]
fn test_association_counts() {
    let mut table = RoutingTable::new();
    table.set_routes(
        &key(),
        RouteSet {
            routes: vec![route("foo.example.com"), route("bar.example.com")],
            tcp_routes: vec![TcpRouteSpec::new(61000)],
            ..Default::default()
        },
    );
    table.add_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint2());

    assert_eq!(table.http_associations_count(), 4);
    assert_eq!(table.tcp_associations_count(), 2);
}

// =============================================================================
// TCP mappings
// =============================================================================

#[test]
fn test_tcp_mappings_join_declarations_with_visible_endpoints() {
    let mut table = RoutingTable::new();
    table.set_routes(
        &key(),
        RouteSet {
            tcp_routes: vec![TcpRouteSpec::new(61000)],
            modification_tag: current_tag(),
            ..Default::default()
        },
    );
    table.add_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint2());

    let mappings = table.tcp_mappings(Duration::from_secs(120));
    assert_eq!(mappings.len(), 2);
    for mapping in &mappings {
        assert_eq!(mapping.external_port, 61000);
        assert_eq!(mapping.ttl_seconds, 120);
        assert_eq!(mapping.modification_tag, current_tag());
    }
    let mut backends: Vec<(String, u16)> = mappings
        .iter()
        .map(|m| (m.host.clone(), m.port))
        .collect();
    backends.sort();
    assert_eq!(
        backends,
        vec![("1.1.1.1".to_string(), 11), ("2.2.2.2".to_string(), 22)]
    );
}

// =============================================================================
// Internal routes
// =============================================================================

#[test]
fn test_internal_routes_advertise_the_container_port() {
    let mut table = RoutingTable::new();
    let internal = route("foo.apps.internal");
    table.set_routes(
        &key(),
        RouteSet {
            internal_routes: vec![internal.clone()],
            modification_tag: current_tag(),
            ..Default::default()
        },
    );

    let messages = table.add_endpoint(&key(), endpoint1());
    assert!(messages.registrations.is_empty());
    assert_eq!(messages.internal_registrations.len(), 1);
    assert_eq!(messages.internal_registrations[0].port, 8080);
    assert_eq!(messages.internal_registrations[0].uris, vec![
        "foo.apps.internal".to_string()
    ]);
}

#[test]
fn test_internal_route_removal_unregisters() {
    let mut table = RoutingTable::new();
    table.set_routes(
        &key(),
        RouteSet {
            internal_routes: vec![route("foo.apps.internal")],
            modification_tag: current_tag(),
            ..Default::default()
        },
    );
    table.add_endpoint(&key(), endpoint1());

    let messages = table.set_routes(
        &key(),
        RouteSet {
            modification_tag: Some(tag("def", 0)),
            ..Default::default()
        },
    );
    assert!(messages.registrations.is_empty());
    assert_eq!(messages.internal_unregistrations.len(), 1);
}

// =============================================================================
// Conservation
// =============================================================================

#[test]
fn test_full_emission_always_matches_live_pairings() {
    let mut table = RoutingTable::new();
    let h1 = route("foo.example.com");
    let h2 = route("bar.example.com");

    table.set_routes(&key(), external(vec![h1.clone()], current_tag()));
    table.add_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint2());
    table.set_routes(&key(), external(vec![h1.clone(), h2.clone()], Some(tag("abc", 2))));
    table.remove_endpoint(&key(), endpoint1());
    table.add_endpoint(&key(), endpoint3());

    let messages = table.messages_to_emit();
    assert_eq!(
        sorted(messages.registrations),
        sorted(vec![
            reg(&endpoint2(), &h1),
            reg(&endpoint2(), &h2),
            reg(&endpoint3(), &h1),
            reg(&endpoint3(), &h2),
        ])
    );
}
