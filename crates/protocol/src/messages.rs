//! Wire payloads published on the message bus and the routing API
//!
//! Field names here are router contracts. The greeting payload uses the
//! camelCase names the HTTP routers announce themselves with; the registry
//! message uses the snake_case names the routers' registry consumers parse.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Endpoint, ModificationTag, Route};

/// Bus subjects used by the emitter
pub mod subjects {
    /// Broadcast announcements from HTTP routers
    pub const ROUTER_START: &str = "router.start";
    /// Greeting published by the emitter, carrying a reply subject
    pub const ROUTER_GREET: &str = "router.greet";
    /// Route registrations for HTTP routers
    pub const ROUTER_REGISTER: &str = "router.register";
    /// Route unregistrations for HTTP routers
    pub const ROUTER_UNREGISTER: &str = "router.unregister";
    /// Broadcast announcements from the service-discovery peer
    pub const SERVICE_DISCOVERY_START: &str = "service-discovery.start";
    /// Greeting published to the service-discovery peer
    pub const SERVICE_DISCOVERY_GREET: &str = "service-discovery.greet";
    /// Internal-route registrations
    pub const SERVICE_DISCOVERY_REGISTER: &str = "service-discovery.register";
    /// Internal-route unregistrations
    pub const SERVICE_DISCOVERY_UNREGISTER: &str = "service-discovery.unregister";
}

/// Handshake payload announced by routers (and the service-discovery peer)
///
/// Routers broadcast this on `router.start` and send it directly to the
/// reply subject carried by a `router.greet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterGreeting {
    /// How often the router wants to hear registrations, in seconds
    #[serde(rename = "minimumRegisterIntervalInSeconds")]
    pub minimum_register_interval_in_seconds: u64,

    /// How long the router waits before pruning an unheard entry, in seconds
    #[serde(rename = "pruneThresholdInSeconds")]
    pub prune_threshold_in_seconds: u64,
}

impl RouterGreeting {
    /// The announced register interval as a duration
    #[inline]
    pub fn register_interval(&self) -> Duration {
        Duration::from_secs(self.minimum_register_interval_in_seconds)
    }
}

/// A single register/unregister payload for one (route, endpoint) pairing
///
/// Registrations and unregistrations share this schema; only the subject
/// they are published on differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryMessage {
    /// Backend host the router should proxy to
    pub host: String,

    /// Backend port the router should proxy to
    pub port: u16,

    /// Hostnames registered for this backend (always exactly one here;
    /// the fan-out emits one message per pairing)
    pub uris: Vec<String>,

    /// Log identifier for access-log attribution
    pub app: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_segment: Option<String>,

    /// Instance identifier, forwarded for sticky-session affinity
    pub private_instance_id: String,

    /// Instance index, forwarded as a string per the router contract
    pub private_instance_index: String,
}

impl RegistryMessage {
    /// Build the message for an external (route, endpoint) pairing
    pub fn for_route(endpoint: &Endpoint, route: &Route) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            uris: vec![route.hostname.clone()],
            app: route.log_guid.clone(),
            route_service_url: route.route_service_url.clone(),
            isolation_segment: route.isolation_segment.clone(),
            private_instance_id: endpoint.instance_guid.clone(),
            private_instance_index: endpoint.index.to_string(),
        }
    }

    /// Build the message for an internal (route, endpoint) pairing
    ///
    /// Internal routes resolve container-to-container, so the advertised
    /// port is the container-side one.
    pub fn for_internal_route(endpoint: &Endpoint, route: &Route) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.container_port,
            uris: vec![route.hostname.clone()],
            app: route.log_guid.clone(),
            route_service_url: None,
            isolation_segment: None,
            private_instance_id: endpoint.instance_guid.clone(),
            private_instance_index: endpoint.index.to_string(),
        }
    }

    /// The identity a downstream router keys this registration on
    ///
    /// Two messages with the same identity address the same registry entry:
    /// re-sending with different metadata (route-service URL, tags) updates
    /// the entry in place, so no unregistration is needed for such changes.
    pub fn identity(&self) -> RegistrationIdentity {
        RegistrationIdentity {
            uri: self.uris.first().cloned().unwrap_or_default(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Registry-entry identity: (uri, host, port)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationIdentity {
    pub uri: String,
    pub host: String,
    pub port: u16,
}

/// A TCP route mapping posted to the routing API
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TcpRouteMapping {
    /// External port on the TCP router
    pub external_port: u16,

    /// Backend host
    pub host: String,

    /// Backend port
    pub port: u16,

    /// How long the mapping stays alive without re-registration
    pub ttl_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_tag: Option<ModificationTag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint {
            instance_guid: "ig-1".to_string(),
            host: "1.1.1.1".to_string(),
            index: 0,
            domain: "domain".to_string(),
            port: 11,
            container_port: 8080,
            evacuating: false,
            modification_tag: None,
        }
    }

    #[test]
    fn greeting_uses_router_field_names() {
        let greeting = RouterGreeting {
            minimum_register_interval_in_seconds: 20,
            prune_threshold_in_seconds: 120,
        };

        let json = serde_json::to_string(&greeting).unwrap();
        assert!(json.contains("\"minimumRegisterIntervalInSeconds\":20"));
        assert!(json.contains("\"pruneThresholdInSeconds\":120"));

        let parsed: RouterGreeting = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, greeting);
        assert_eq!(parsed.register_interval(), Duration::from_secs(20));
    }

    #[test]
    fn registry_message_pairs_route_and_endpoint() {
        let route = Route::new("foo.example.com", "some-log-guid")
            .with_route_service_url("https://rs.example.com");
        let message = RegistryMessage::for_route(&endpoint(), &route);

        assert_eq!(message.host, "1.1.1.1");
        assert_eq!(message.port, 11);
        assert_eq!(message.uris, vec!["foo.example.com"]);
        assert_eq!(message.app, "some-log-guid");
        assert_eq!(
            message.route_service_url.as_deref(),
            Some("https://rs.example.com")
        );
        assert_eq!(message.private_instance_id, "ig-1");
        assert_eq!(message.private_instance_index, "0");
    }

    #[test]
    fn internal_message_advertises_container_port() {
        let route = Route::new("foo.apps.internal", "some-log-guid");
        let message = RegistryMessage::for_internal_route(&endpoint(), &route);
        assert_eq!(message.port, 8080);
    }

    #[test]
    fn identity_ignores_route_service_url() {
        let plain = Route::new("foo.example.com", "some-log-guid");
        let with_url = plain.clone().with_route_service_url("https://rs.example.com");

        let a = RegistryMessage::for_route(&endpoint(), &plain);
        let b = RegistryMessage::for_route(&endpoint(), &with_url);

        assert_ne!(a, b);
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn omits_empty_optional_fields_on_the_wire() {
        let route = Route::new("foo.example.com", "some-log-guid");
        let json = serde_json::to_string(&RegistryMessage::for_route(&endpoint(), &route)).unwrap();
        assert!(!json.contains("route_service_url"));
        assert!(!json.contains("isolation_segment"));
    }
}
