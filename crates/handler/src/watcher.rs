//! The event task - sole caller of the handler
//!
//! Serializes the syncer's channels and the raw event stream into handler
//! calls. Because everything funnels through this one task, the routing
//! table never needs a lock and diffs reflect observation order.

use std::sync::Arc;

use beacon_bus::MessageBus;
use beacon_protocol::{ActualLrp, Event};
use beacon_syncer::SyncEvents;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::handler::Handler;
use crate::source::ClusterStateSource;

/// The event loop around a [`Handler`]
pub struct Watcher<B, S> {
    handler: Handler<B>,
    source: Arc<S>,
    events: SyncEvents,
    event_stream: mpsc::Receiver<Event>,
    stream_open: bool,
}

impl<B: MessageBus, S: ClusterStateSource> Watcher<B, S> {
    /// Create the event task
    pub fn new(
        handler: Handler<B>,
        source: Arc<S>,
        events: SyncEvents,
        event_stream: mpsc::Receiver<Event>,
    ) -> Self {
        Self {
            handler,
            source,
            events,
            event_stream,
            stream_open: true,
        }
    }

    /// Run until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("watcher starting");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("watcher stopping");
                    return;
                }
                Some(_) = self.events.sync.recv() => {
                    self.run_sync().await;
                }
                Some(_) = self.events.emit.recv() => {
                    tracing::info!("emitting routes");
                    self.handler.emit().await;
                }
                Some(_) = self.events.internal_sync.recv() => {
                    self.handler.emit_internal().await;
                }
                Some(_) = self.events.internal_emit.recv() => {
                    self.handler.emit_internal().await;
                }
                event = self.event_stream.recv(), if self.stream_open => {
                    match event {
                        Some(event) => self.apply_event(event).await,
                        None => {
                            tracing::warn!("event stream ended, relying on periodic sync");
                            self.stream_open = false;
                        }
                    }
                }
            }
        }
    }

    /// Apply one event, refreshing desired state first when the table has
    /// no routes for the instance yet
    async fn apply_event(&mut self, event: Event) {
        if let Some(actual) = refresh_candidate(&event) {
            if self.handler.should_refresh_desired(actual) {
                tracing::debug!(
                    process_guid = %actual.process_guid,
                    "refreshing desired state before endpoint event"
                );
                match self
                    .source
                    .desired_workloads_for(&[actual.process_guid.clone()])
                    .await
                {
                    Ok(desired) => self.handler.refresh_desired(desired).await,
                    Err(error) => {
                        tracing::warn!(error = %error, "failed to refresh desired state");
                    }
                }
            }
        }
        self.handler.handle_event(event).await;
    }

    /// Full reconciliation: scan the store while buffering in-flight
    /// events, then hand everything to the handler's sync
    async fn run_sync(&mut self) {
        tracing::info!("syncing");

        let source = Arc::clone(&self.source);
        let scan = async move {
            let desired = source.desired_workloads().await?;
            let actuals = source.actual_workloads().await?;
            let domains = source.fresh_domains().await?;
            Ok::<_, crate::source::StateSourceError>((desired, actuals, domains))
        };
        tokio::pin!(scan);

        let mut cached_events = Vec::new();
        let outcome = loop {
            tokio::select! {
                outcome = &mut scan => break outcome,
                event = self.event_stream.recv(), if self.stream_open => {
                    match event {
                        Some(event) => cached_events.push(event),
                        None => self.stream_open = false,
                    }
                }
            }
        };

        match outcome {
            Ok((desired, actuals, domains)) => {
                self.handler
                    .sync(desired, actuals, domains, cached_events)
                    .await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "sync scan failed, keeping current table");
                // the buffered events are real; apply them directly
                for event in cached_events {
                    self.apply_event(event).await;
                }
            }
        }
    }
}

/// The running actual that may need a desired-state refresh first
///
/// Only arriving endpoints qualify; a removal for a routeless key has
/// nothing to unregister anyway.
fn refresh_candidate(event: &Event) -> Option<&ActualLrp> {
    let actual = match event {
        Event::ActualCreated { actual } => actual,
        Event::ActualChanged { after, .. } => after,
        _ => return None,
    };
    actual.is_running().then_some(actual)
}
