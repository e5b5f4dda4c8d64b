//! Translation from cluster workload state into table inputs
//!
//! Desired workloads fan out into one (key, route set) per container port;
//! actual instances fan out into one (key, endpoint) per port mapping.

use beacon_protocol::{ActualLrp, DesiredLrp, Endpoint, Route, RoutingKey, TcpRouteSpec};

use crate::entry::RouteSet;

/// Route sets owned by a desired workload, one per container port
pub fn route_sets_for_desired(desired: &DesiredLrp) -> Vec<(RoutingKey, RouteSet)> {
    desired
        .routes
        .iter()
        .map(|group| {
            let key = RoutingKey::new(&desired.process_guid, group.container_port);
            let routes = group
                .hostnames
                .iter()
                .map(|hostname| Route {
                    hostname: hostname.clone(),
                    log_guid: desired.log_guid.clone(),
                    route_service_url: group.route_service_url.clone(),
                    isolation_segment: group.isolation_segment.clone(),
                })
                .collect();
            let internal_routes = group
                .internal_hostnames
                .iter()
                .map(|hostname| Route::new(hostname, &desired.log_guid))
                .collect();
            let tcp_routes = group
                .external_tcp_ports
                .iter()
                .copied()
                .map(TcpRouteSpec::new)
                .collect();

            (
                key,
                RouteSet {
                    routes,
                    internal_routes,
                    tcp_routes,
                    modification_tag: desired.modification_tag.clone(),
                },
            )
        })
        .collect()
}

/// Endpoints exposed by an actual instance, one per port mapping
pub fn endpoints_for_actual(actual: &ActualLrp) -> Vec<(RoutingKey, Endpoint)> {
    actual
        .ports
        .iter()
        .map(|mapping| {
            let key = RoutingKey::new(&actual.process_guid, mapping.container_port);
            let endpoint = Endpoint {
                instance_guid: actual.instance_guid.clone(),
                host: actual.host.clone(),
                index: actual.index,
                domain: actual.domain.clone(),
                port: mapping.host_port,
                container_port: mapping.container_port,
                evacuating: actual.evacuating,
                modification_tag: actual.modification_tag.clone(),
            };
            (key, endpoint)
        })
        .collect()
}
