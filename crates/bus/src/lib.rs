//! Beacon Bus - the pub/sub seam
//!
//! Everything that talks to the message bus does so through [`MessageBus`],
//! so the handshake and the emitters never depend on a concrete transport.
//! Two implementations ship here:
//!
//! - [`InProcessBus`] - a subject-keyed fan-out inside the process, used by
//!   tests and anything that wants to observe traffic without a broker.
//! - [`NatsBus`] - a deliberately small client for the NATS text protocol.
//!   The emitter treats the bus as an external collaborator: no TLS, no
//!   auth, no reconnect logic; a broken connection surfaces as errors and
//!   the supervising process restarts.
//!
//! Dropping a [`Subscription`] unsubscribes; the handshake's
//! "auto-unsubscribe after one reply" contract is expressed by taking one
//! message and dropping the subscription.

mod error;
mod in_process;
mod nats;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use error::{BusError, Result};
pub use in_process::InProcessBus;
pub use nats::NatsBus;

/// A message delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Subject the message was published on
    pub subject: String,

    /// Reply subject, when the publisher requested one
    pub reply_to: Option<String>,

    pub payload: Vec<u8>,
}

/// Handle to a subject subscription
///
/// Messages are buffered in a bounded channel; the transport drops for slow
/// consumers rather than blocking the bus. Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    subject: String,
    receiver: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    pub(crate) fn new(subject: impl Into<String>, receiver: mpsc::Receiver<BusMessage>) -> Self {
        Self {
            subject: subject.into(),
            receiver,
        }
    }

    /// Subject this subscription listens on
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next message; `None` once the bus side is gone
    pub async fn next(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Take a message if one is already buffered
    pub fn try_next(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }
}

/// Abstract pub/sub transport
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Publish a payload on a subject
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Publish a payload carrying a reply subject
    async fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: Vec<u8>,
    ) -> Result<()>;

    /// Subscribe to a subject
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;
}
