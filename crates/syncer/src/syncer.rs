//! The syncer control loop

use std::sync::Arc;
use std::time::Duration;

use beacon_bus::{MessageBus, Subscription};
use beacon_protocol::{subjects, RouterGreeting};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, SyncerError};
use crate::events::{event_channels, EventSenders, SyncEvents};

/// How often greetings are re-published while no router has answered
const GREET_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Fraction of the register interval used as the jitter window
const JITTER_FRACTION: f64 = 0.2;

/// Buffer for parsed announcements between callback tasks and the loop
const ANNOUNCEMENT_BUFFER: usize = 4;

/// Drives the handshake and the periodic sync/emit cadence
///
/// Constructed together with its [`SyncEvents`] surface; `run` owns the
/// task until cancellation. The loop is an explicit state machine:
/// subscribe, greet until answered, optionally greet service discovery,
/// fire the initial sync, then multiplex tickers and announcements.
pub struct Syncer<B> {
    bus: Arc<B>,
    sync_interval: Duration,
    wait_for_internal_routes_greeting: bool,
    senders: EventSenders,
}

impl<B: MessageBus> Syncer<B> {
    /// Create a syncer and the event surface its consumer reads
    pub fn new(
        bus: Arc<B>,
        sync_interval: Duration,
        wait_for_internal_routes_greeting: bool,
    ) -> (Self, SyncEvents) {
        let (senders, events) = event_channels();
        (
            Self {
                bus,
                sync_interval,
                wait_for_internal_routes_greeting,
                senders,
            },
            events,
        )
    }

    /// Run until cancelled
    ///
    /// Returns an error only for fatal startup failures (subscription or
    /// greeting publish); the supervisor should treat that as a non-zero
    /// exit.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        tracing::info!("syncer starting");

        let reply_subject = Uuid::new_v4().to_string();
        let mut router_announcements = self.listen_for_router(&reply_subject).await?;

        let mut internal_announcements = if self.wait_for_internal_routes_greeting {
            Some(self.listen_for_service_discovery().await?)
        } else {
            None
        };

        // keep greeting until we hear from a router
        let mut register_interval = loop {
            tracing::info!("greeting router");
            self.bus
                .publish_with_reply(subjects::ROUTER_GREET, &reply_subject, Vec::new())
                .await
                .map_err(SyncerError::Greet)?;

            tokio::select! {
                Some(interval) = router_announcements.recv() => break interval,
                _ = tokio::time::sleep(GREET_RETRY_INTERVAL) => {}
                _ = cancel.cancelled() => {
                    tracing::info!("syncer stopping");
                    return Ok(());
                }
            }
        };
        tracing::info!(
            interval_secs = register_interval.as_secs(),
            "received router register interval"
        );

        if self.wait_for_internal_routes_greeting {
            tracing::info!("greeting service discovery");
            let internal_reply_subject = Uuid::new_v4().to_string();
            self.listen_for_internal_reply(&internal_reply_subject)
                .await?;
            self.bus
                .publish_with_reply(
                    subjects::SERVICE_DISCOVERY_GREET,
                    &internal_reply_subject,
                    Vec::new(),
                )
                .await
                .map_err(SyncerError::Greet)?;
            self.senders.fire_internal_sync();
        }

        self.senders.fire_sync();

        // now keep emitting at the router's cadence, syncing at ours
        let mut sync_ticker = interval_at(
            Instant::now() + self.sync_interval,
            self.sync_interval,
        );
        sync_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut router_ticker =
            interval_at(Instant::now() + register_interval, register_interval);
        router_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(new_interval) = router_announcements.recv() => {
                    tracing::info!(
                        interval_secs = new_interval.as_secs(),
                        "received new router register interval"
                    );
                    // spread re-registration across emitter replicas before
                    // adopting the new cadence
                    tokio::time::sleep(jitter_within(new_interval)).await;
                    register_interval = new_interval;
                    router_ticker =
                        interval_at(Instant::now() + register_interval, register_interval);
                    router_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    self.senders.fire_emit();
                }
                Some(_) = recv_optional(&mut internal_announcements) => {
                    tracing::info!("received service-discovery register interval");
                    self.senders.fire_internal_emit();
                }
                _ = router_ticker.tick() => {
                    tracing::info!("emitting routes");
                    self.senders.fire_emit();
                    if self.wait_for_internal_routes_greeting {
                        self.senders.fire_internal_emit();
                    }
                }
                _ = sync_ticker.tick() => {
                    tracing::info!("syncing");
                    self.senders.fire_sync();
                    if self.wait_for_internal_routes_greeting {
                        self.senders.fire_internal_sync();
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("syncer stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Subscribe to router announcements: the broadcast subject plus our
    /// ephemeral reply subject (dropped after one reply)
    async fn listen_for_router(&self, reply_subject: &str) -> Result<mpsc::Receiver<Duration>> {
        let (tx, rx) = mpsc::channel(ANNOUNCEMENT_BUFFER);

        let broadcast = self
            .bus
            .subscribe(subjects::ROUTER_START)
            .await
            .map_err(SyncerError::Subscribe)?;
        tokio::spawn(forward_greetings(broadcast, tx.clone(), None));

        let reply = self
            .bus
            .subscribe(reply_subject)
            .await
            .map_err(SyncerError::Subscribe)?;
        tokio::spawn(forward_greetings(reply, tx, Some(1)));

        Ok(rx)
    }

    /// Subscribe to service-discovery broadcast announcements
    async fn listen_for_service_discovery(&self) -> Result<mpsc::Receiver<Duration>> {
        let (tx, rx) = mpsc::channel(ANNOUNCEMENT_BUFFER);
        let broadcast = self
            .bus
            .subscribe(subjects::SERVICE_DISCOVERY_START)
            .await
            .map_err(SyncerError::Subscribe)?;
        tokio::spawn(forward_greetings(broadcast, tx, None));
        Ok(rx)
    }

    /// Subscribe the service-discovery greet reply subject, one reply only
    ///
    /// The reply is only an acknowledgement; its interval is not consumed
    /// beyond logging inside the forwarder, so the channel is dropped here.
    async fn listen_for_internal_reply(&self, reply_subject: &str) -> Result<()> {
        let (tx, _rx) = mpsc::channel(ANNOUNCEMENT_BUFFER);
        let reply = self
            .bus
            .subscribe(reply_subject)
            .await
            .map_err(SyncerError::Subscribe)?;
        tokio::spawn(forward_greetings(reply, tx, Some(1)));
        Ok(())
    }
}

/// Receive from an optional channel; pends forever when absent
async fn recv_optional(receiver: &mut Option<mpsc::Receiver<Duration>>) -> Option<Duration> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Forward parsed greeting payloads from a subscription into a channel
///
/// Malformed payloads are logged and ignored; the subscription stays open.
/// With a limit, the subscription is dropped (unsubscribed) after that many
/// valid greetings.
async fn forward_greetings(
    mut subscription: Subscription,
    tx: mpsc::Sender<Duration>,
    limit: Option<usize>,
) {
    let mut forwarded = 0;
    while let Some(message) = subscription.next().await {
        match serde_json::from_slice::<RouterGreeting>(&message.payload) {
            Ok(greeting) => {
                if tx.send(greeting.register_interval()).await.is_err() {
                    return;
                }
                forwarded += 1;
                if limit.is_some_and(|limit| forwarded >= limit) {
                    return;
                }
            }
            Err(error) => {
                tracing::warn!(
                    subject = subscription.subject(),
                    payload = %String::from_utf8_lossy(&message.payload),
                    error = %error,
                    "received invalid greeting payload"
                );
            }
        }
    }
}

/// Uniform random delay in [0, JITTER_FRACTION x interval)
fn jitter_within(interval: Duration) -> Duration {
    let window = interval.mul_f64(JITTER_FRACTION);
    let nanos = window.as_nanos() as u64;
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(0..nanos))
}
