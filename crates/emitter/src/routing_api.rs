//! HTTP transport for TCP route mappings

use std::time::Duration;

use beacon_protocol::TcpRouteMapping;

use crate::error::{EmitError, Result};

/// POSTs mapping sets to the TCP routing API
///
/// Mappings carry a TTL, so the API ages out anything that stops being
/// re-posted; re-posting an unchanged set is a no-op on the API side. That
/// makes the periodic emit tick the only write path this needs.
pub struct RoutingApiEmitter {
    client: reqwest::Client,
    create_url: String,
}

impl RoutingApiEmitter {
    /// Create an emitter against the given API base URL
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            create_url: format!("{}/v1/tcp_routes/create", base_url.trim_end_matches('/')),
        })
    }

    /// Post the current mapping set
    pub async fn emit(&self, mappings: &[TcpRouteMapping]) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }

        let response = self.client.post(&self.create_url).json(mappings).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EmitError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(mappings = mappings.len(), "posted tcp route mappings");
        Ok(())
    }
}
