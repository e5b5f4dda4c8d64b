//! In-process bus - subject-keyed fan-out without a broker

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{BusMessage, MessageBus, Result, Subscription};

/// Per-subscription buffer depth
const SUBSCRIPTION_BUFFER: usize = 64;

/// A process-local message bus
///
/// Cheap to clone; all clones share the same subject table. Publishing to a
/// subject with no subscribers succeeds and delivers nothing, matching
/// broker semantics. Slow subscribers lose messages rather than blocking
/// the publisher.
#[derive(Debug, Clone, Default)]
pub struct InProcessBus {
    subjects: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<BusMessage>>>>>,
}

impl InProcessBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn fan_out(&self, subject: &str, reply_to: Option<&str>, payload: Vec<u8>) {
        let mut subjects = self.subjects.lock().unwrap_or_else(|e| e.into_inner());
        let Some(senders) = subjects.get_mut(subject) else {
            return;
        };

        senders.retain(|sender| !sender.is_closed());
        for sender in senders.iter() {
            let message = BusMessage {
                subject: subject.to_string(),
                reply_to: reply_to.map(str::to_string),
                payload: payload.clone(),
            };
            if sender.try_send(message).is_err() {
                tracing::trace!(subject, "in-process subscriber full, dropping message");
            }
        }
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.fan_out(subject, None, payload);
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.fan_out(subject, Some(reply_to), payload);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subjects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(subject.to_string())
            .or_default()
            .push(sender);
        Ok(Subscription::new(subject, receiver))
    }
}
