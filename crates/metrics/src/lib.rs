//! Beacon Metrics - counters and gauges for emitted routes
//!
//! One facade struct holds every metric the emitter reports. Counters and
//! gauges are atomics, so any task can record through a shared `Arc`
//! without locks; `snapshot()` produces a serializable point-in-time copy
//! for the periodic reporter.

mod reporter;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use reporter::MetricsReporter;

/// Counters and gauges recorded by the emitter
///
/// Counters only ever increase; gauges are set to the latest observed
/// value. `last_swap_duration` keeps the most recent full-sync swap time.
#[derive(Debug, Default)]
pub struct EmitterMetrics {
    /// Registrations published (diffs and refreshes alike)
    routes_registered: AtomicU64,

    /// Unregistrations published
    routes_unregistered: AtomicU64,

    /// Registrations published by periodic full refreshes
    routes_synced: AtomicU64,

    /// Current route-endpoint associations in the table
    routes_total: AtomicU64,

    /// HTTP associations, published in local mode
    http_route_count: AtomicU64,

    /// TCP associations, published in local mode
    tcp_route_count: AtomicU64,

    /// Duration of the most recent table swap, in nanoseconds
    last_swap_duration_ns: AtomicU64,
}

impl EmitterMetrics {
    /// Create a facade with everything at zero
    pub const fn new() -> Self {
        Self {
            routes_registered: AtomicU64::new(0),
            routes_unregistered: AtomicU64::new(0),
            routes_synced: AtomicU64::new(0),
            routes_total: AtomicU64::new(0),
            http_route_count: AtomicU64::new(0),
            tcp_route_count: AtomicU64::new(0),
            last_swap_duration_ns: AtomicU64::new(0),
        }
    }

    /// Count published registrations
    #[inline]
    pub fn record_registered(&self, delta: u64) {
        self.routes_registered.fetch_add(delta, Ordering::Relaxed);
    }

    /// Count published unregistrations
    #[inline]
    pub fn record_unregistered(&self, delta: u64) {
        self.routes_unregistered.fetch_add(delta, Ordering::Relaxed);
    }

    /// Count registrations published by a full refresh
    #[inline]
    pub fn record_synced(&self, delta: u64) {
        self.routes_synced.fetch_add(delta, Ordering::Relaxed);
    }

    /// Set the total-routes gauge
    #[inline]
    pub fn set_routes_total(&self, value: u64) {
        self.routes_total.store(value, Ordering::Relaxed);
    }

    /// Set the HTTP route-count gauge
    #[inline]
    pub fn set_http_route_count(&self, value: u64) {
        self.http_route_count.store(value, Ordering::Relaxed);
    }

    /// Set the TCP route-count gauge
    #[inline]
    pub fn set_tcp_route_count(&self, value: u64) {
        self.tcp_route_count.store(value, Ordering::Relaxed);
    }

    /// Record how long a table swap took
    #[inline]
    pub fn record_swap_duration(&self, duration: Duration) {
        self.last_swap_duration_ns
            .store(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> EmitterMetricsSnapshot {
        EmitterMetricsSnapshot {
            routes_registered: self.routes_registered.load(Ordering::Relaxed),
            routes_unregistered: self.routes_unregistered.load(Ordering::Relaxed),
            routes_synced: self.routes_synced.load(Ordering::Relaxed),
            routes_total: self.routes_total.load(Ordering::Relaxed),
            http_route_count: self.http_route_count.load(Ordering::Relaxed),
            tcp_route_count: self.tcp_route_count.load(Ordering::Relaxed),
            last_swap_duration_ns: self.last_swap_duration_ns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the emitter metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EmitterMetricsSnapshot {
    pub routes_registered: u64,
    pub routes_unregistered: u64,
    pub routes_synced: u64,
    pub routes_total: u64,
    pub http_route_count: u64,
    pub tcp_route_count: u64,
    pub last_swap_duration_ns: u64,
}

impl EmitterMetricsSnapshot {
    /// The most recent swap duration
    #[inline]
    pub fn last_swap_duration(&self) -> Duration {
        Duration::from_nanos(self.last_swap_duration_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_gauges_replace() {
        let metrics = EmitterMetrics::new();

        metrics.record_registered(4);
        metrics.record_registered(2);
        metrics.record_unregistered(1);
        metrics.record_synced(4);
        metrics.set_routes_total(10);
        metrics.set_routes_total(7);
        metrics.set_http_route_count(7);
        metrics.set_tcp_route_count(3);
        metrics.record_swap_duration(Duration::from_millis(12));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.routes_registered, 6);
        assert_eq!(snapshot.routes_unregistered, 1);
        assert_eq!(snapshot.routes_synced, 4);
        assert_eq!(snapshot.routes_total, 7);
        assert_eq!(snapshot.http_route_count, 7);
        assert_eq!(snapshot.tcp_route_count, 3);
        assert_eq!(snapshot.last_swap_duration(), Duration::from_millis(12));
    }

    #[test]
    fn snapshot_serializes_for_the_reporter() {
        let metrics = EmitterMetrics::new();
        metrics.record_registered(1);

        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"routes_registered\":1"));
        assert!(json.contains("\"routes_total\":0"));
    }
}
