//! Routes - hostnames exposed for a routing key

use serde::{Deserialize, Serialize};

/// A hostname registration owned by a routing key
///
/// Two routes with the same hostname but different route-service URLs are
/// different routes: the URL is part of the route's identity for the
/// downstream router, so changing it must re-register every pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Hostname exposed to external clients
    pub hostname: String,

    /// Log identifier forwarded to the router for access-log attribution
    pub log_guid: String,

    /// Optional route-service URL the router proxies through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,

    /// Optional isolation segment the route is pinned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_segment: Option<String>,
}

impl Route {
    /// Create a route with just a hostname and log guid
    #[inline]
    pub fn new(hostname: impl Into<String>, log_guid: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            log_guid: log_guid.into(),
            route_service_url: None,
            isolation_segment: None,
        }
    }

    /// Set the route-service URL
    #[inline]
    pub fn with_route_service_url(mut self, url: impl Into<String>) -> Self {
        self.route_service_url = Some(url.into());
        self
    }

    /// Set the isolation segment
    #[inline]
    pub fn with_isolation_segment(mut self, segment: impl Into<String>) -> Self {
        self.isolation_segment = Some(segment.into());
        self
    }
}

/// A TCP route declaration owned by a routing key
///
/// Declares that the routing key's backends should be reachable through the
/// TCP router on `external_port`. The concrete host:port backends are joined
/// in from the key's endpoints when mappings are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TcpRouteSpec {
    /// External port on the TCP router
    pub external_port: u16,
}

impl TcpRouteSpec {
    /// Create a new TCP route declaration
    #[inline]
    pub fn new(external_port: u16) -> Self {
        Self { external_port }
    }
}
