//! Periodic metrics reporter
//!
//! Dumps a snapshot of the emitter metrics through tracing at a fixed
//! interval. Runs as its own task; cancellation stops it at the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::EmitterMetrics;

/// Reporter task for [`EmitterMetrics`]
pub struct MetricsReporter {
    metrics: Arc<EmitterMetrics>,
    interval: Duration,
}

impl MetricsReporter {
    /// Create a reporter for the given facade
    pub fn new(metrics: Arc<EmitterMetrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    /// Run until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick fires immediately; skip it so the first report
        // covers a full interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    info!(
                        routes_registered = snapshot.routes_registered,
                        routes_unregistered = snapshot.routes_unregistered,
                        routes_synced = snapshot.routes_synced,
                        routes_total = snapshot.routes_total,
                        http_route_count = snapshot.http_route_count,
                        tcp_route_count = snapshot.tcp_route_count,
                        last_swap_ms = snapshot.last_swap_duration().as_millis() as u64,
                        "emitter metrics"
                    );
                }
                _ = cancel.cancelled() => {
                    return;
                }
            }
        }
    }
}
