//! Bus transport for registry messages

use std::sync::Arc;

use beacon_bus::MessageBus;
use beacon_protocol::{subjects, RegistryMessage};
use beacon_table::MessagesToEmit;

use crate::error::{EmitError, Result};

/// Publishes registry messages on the router and service-discovery subjects
pub struct NatsEmitter<B> {
    bus: Arc<B>,
}

impl<B: MessageBus> NatsEmitter<B> {
    /// Create an emitter over the given bus
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Publish every message in the diff
    ///
    /// Individual publish failures are logged and counted but do not stop
    /// the rest of the diff; the caller learns how many were lost through
    /// the returned error.
    pub async fn emit(&self, messages: &MessagesToEmit) -> Result<()> {
        let batches: [(&str, &[RegistryMessage]); 4] = [
            (subjects::ROUTER_REGISTER, &messages.registrations),
            (subjects::ROUTER_UNREGISTER, &messages.unregistrations),
            (
                subjects::SERVICE_DISCOVERY_REGISTER,
                &messages.internal_registrations,
            ),
            (
                subjects::SERVICE_DISCOVERY_UNREGISTER,
                &messages.internal_unregistrations,
            ),
        ];

        let mut failed = 0;
        for (subject, list) in batches {
            for message in list {
                let payload = serde_json::to_vec(message)?;
                if let Err(error) = self.bus.publish(subject, payload).await {
                    failed += 1;
                    tracing::warn!(
                        subject,
                        uri = %message.uris.first().map(String::as_str).unwrap_or_default(),
                        error = %error,
                        "failed to publish registry message"
                    );
                }
            }
        }

        if failed > 0 {
            return Err(EmitError::PartialPublish { failed });
        }
        Ok(())
    }
}
