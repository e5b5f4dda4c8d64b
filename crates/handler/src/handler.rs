//! Event-to-table translation and diff emission

use std::sync::Arc;
use std::time::{Duration, Instant};

use beacon_bus::MessageBus;
use beacon_emitter::{NatsEmitter, RoutingApiEmitter};
use beacon_metrics::EmitterMetrics;
use beacon_protocol::{ActualLrp, DesiredLrp, DomainSet, Event};
use beacon_table::{
    endpoints_for_actual, route_sets_for_desired, MessagesToEmit, RoutingTable, SnapshotBuilder,
};

/// The sole mutator of the live routing table
pub struct Handler<B> {
    table: RoutingTable,
    nats_emitter: Option<NatsEmitter<B>>,
    routing_api_emitter: Option<RoutingApiEmitter>,
    local_mode: bool,
    tcp_route_ttl: Duration,
    metrics: Arc<EmitterMetrics>,
}

impl<B: MessageBus> Handler<B> {
    /// Create a handler over a fresh table
    pub fn new(
        nats_emitter: Option<NatsEmitter<B>>,
        routing_api_emitter: Option<RoutingApiEmitter>,
        local_mode: bool,
        tcp_route_ttl: Duration,
        metrics: Arc<EmitterMetrics>,
    ) -> Self {
        Self {
            table: RoutingTable::new(),
            nats_emitter,
            routing_api_emitter,
            local_mode,
            tcp_route_ttl,
            metrics,
        }
    }

    /// The live table, for observability
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Apply one state event and publish the resulting diff
    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::DesiredCreated { desired } => {
                tracing::debug!(process_guid = %desired.process_guid, "handling desired create");
                self.set_desired_routes(&desired).await;
            }
            Event::DesiredChanged { after, .. } => {
                tracing::debug!(process_guid = %after.process_guid, "handling desired update");
                self.set_desired_routes(&after).await;
            }
            Event::DesiredRemoved { desired } => {
                tracing::debug!(process_guid = %desired.process_guid, "handling desired delete");
                for (key, _) in route_sets_for_desired(&desired) {
                    let messages = self
                        .table
                        .remove_routes(&key, desired.modification_tag.clone());
                    self.emit_messages(messages).await;
                }
            }
            Event::ActualCreated { actual } => {
                if actual.is_running() {
                    tracing::debug!(instance_guid = %actual.instance_guid, "adding endpoint");
                    self.add_actual_endpoints(&actual).await;
                }
            }
            Event::ActualChanged { before, after } => {
                if after.is_running() {
                    tracing::debug!(instance_guid = %after.instance_guid, "adding endpoint");
                    self.add_actual_endpoints(&after).await;
                } else if before.is_running() {
                    tracing::debug!(instance_guid = %before.instance_guid, "removing endpoint");
                    self.remove_actual_endpoints(&before).await;
                }
            }
            Event::ActualRemoved { actual } => {
                if actual.is_running() {
                    tracing::debug!(instance_guid = %actual.instance_guid, "removing endpoint");
                    self.remove_actual_endpoints(&actual).await;
                }
            }
            Event::Unknown => {
                tracing::warn!("dropping unrecognizable event");
            }
        }
    }

    /// Atomic reconciliation against a full cluster scan
    ///
    /// `cached_events` are events that arrived while the scan was in
    /// flight. They are replayed against the snapshot with the emitters
    /// disabled, so the swap diff already accounts for them - without the
    /// replay, the swap would undo their effect until the next event.
    pub async fn sync(
        &mut self,
        desired: Vec<DesiredLrp>,
        actuals: Vec<ActualLrp>,
        domains: DomainSet,
        cached_events: Vec<Event>,
    ) {
        tracing::debug!(
            desired = desired.len(),
            actuals = actuals.len(),
            cached_events = cached_events.len(),
            "starting sync"
        );

        let mut builder = SnapshotBuilder::new();
        for workload in &desired {
            builder.insert_desired(workload);
        }
        for actual in &actuals {
            builder.insert_actual(actual);
        }

        let nats_emitter = self.nats_emitter.take();
        let routing_api_emitter = self.routing_api_emitter.take();
        let live = std::mem::replace(&mut self.table, builder.build());
        for event in cached_events {
            self.handle_event(event).await;
        }
        let snapshot = std::mem::replace(&mut self.table, live);
        self.nats_emitter = nats_emitter;
        self.routing_api_emitter = routing_api_emitter;

        let start = Instant::now();
        let messages = self.table.swap(snapshot, &domains);
        self.metrics.record_swap_duration(start.elapsed());

        tracing::debug!(
            registrations = messages.registrations.len(),
            unregistrations = messages.unregistrations.len(),
            internal_registrations = messages.internal_registrations.len(),
            internal_unregistrations = messages.internal_unregistrations.len(),
            "emitting sync diff"
        );
        self.emit_messages(messages).await;
        self.emit_tcp_mappings().await;

        if self.local_mode {
            self.metrics
                .set_http_route_count(self.table.http_associations_count());
            self.metrics
                .set_tcp_route_count(self.table.tcp_associations_count());
        }
        tracing::debug!("sync completed");
    }

    /// Idempotent full refresh of everything the table knows
    pub async fn emit(&mut self) {
        let messages = self.table.messages_to_emit();
        self.metrics.record_synced(messages.registration_count());

        if let Some(emitter) = &self.nats_emitter {
            if let Err(error) = emitter.emit(&messages).await {
                tracing::warn!(error = %error, "failed to emit full registration set");
            }
        }
        self.emit_tcp_mappings().await;
        self.metrics
            .set_routes_total(self.table.http_associations_count());
    }

    /// Re-publish only the internal-routes side of the table
    pub async fn emit_internal(&mut self) {
        let current = self.table.messages_to_emit();
        let messages = MessagesToEmit {
            internal_registrations: current.internal_registrations,
            ..Default::default()
        };
        if messages.is_empty() {
            return;
        }
        if let Some(emitter) = &self.nats_emitter {
            if let Err(error) = emitter.emit(&messages).await {
                tracing::warn!(error = %error, "failed to emit internal registration set");
            }
        }
    }

    /// Whether an endpoint event needs a desired-state refresh first
    ///
    /// True when none of the actual's routing keys currently has external
    /// routes - the endpoint would otherwise register nothing.
    pub fn should_refresh_desired(&self, actual: &ActualLrp) -> bool {
        !self.table.has_external_routes(actual)
    }

    /// Replay freshly fetched desired state into the table
    pub async fn refresh_desired(&mut self, desired: Vec<DesiredLrp>) {
        for workload in desired {
            self.set_desired_routes(&workload).await;
        }
    }

    async fn set_desired_routes(&mut self, desired: &DesiredLrp) {
        for (key, routes) in route_sets_for_desired(desired) {
            let messages = self.table.set_routes(&key, routes);
            self.emit_messages(messages).await;
        }
    }

    async fn add_actual_endpoints(&mut self, actual: &ActualLrp) {
        for (key, endpoint) in endpoints_for_actual(actual) {
            let messages = self.table.add_endpoint(&key, endpoint);
            self.emit_messages(messages).await;
        }
    }

    async fn remove_actual_endpoints(&mut self, actual: &ActualLrp) {
        for (key, endpoint) in endpoints_for_actual(actual) {
            let messages = self.table.remove_endpoint(&key, endpoint);
            self.emit_messages(messages).await;
        }
    }

    /// Publish a diff and count it
    ///
    /// With the emitters disabled (during snapshot replay) this is a
    /// no-op: no publishes, no counter movement.
    async fn emit_messages(&self, messages: MessagesToEmit) {
        if messages.is_empty() {
            return;
        }
        let Some(emitter) = &self.nats_emitter else {
            tracing::debug!("no emitter configured, dropping messages");
            return;
        };

        if let Err(error) = emitter.emit(&messages).await {
            tracing::warn!(error = %error, "failed to emit registry messages");
        }
        self.metrics
            .record_registered(messages.registration_count());
        self.metrics
            .record_unregistered(messages.unregistration_count());
    }

    async fn emit_tcp_mappings(&self) {
        let Some(emitter) = &self.routing_api_emitter else {
            return;
        };
        let mappings = self.table.tcp_mappings(self.tcp_route_ttl);
        if mappings.is_empty() {
            return;
        }
        if let Err(error) = emitter.emit(&mappings).await {
            tracing::warn!(error = %error, "failed to post tcp route mappings");
        }
    }
}
