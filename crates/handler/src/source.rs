//! Cluster state source - the seam to the state store

use std::time::Duration;

use async_trait::async_trait;
use beacon_protocol::{ActualLrp, DesiredLrp, DomainSet};
use thiserror::Error;

/// Errors from the state store
#[derive(Debug, Error)]
pub enum StateSourceError {
    /// The store could not be reached or answered garbage
    #[error("state store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("state store answered with status {status}")]
    Rejected { status: u16 },
}

/// Read access to the cluster's desired and actual state
///
/// A failed fetch aborts the current sync attempt; the next sync tick is
/// the retry.
#[async_trait]
pub trait ClusterStateSource: Send + Sync + 'static {
    /// Every desired workload
    async fn desired_workloads(&self) -> Result<Vec<DesiredLrp>, StateSourceError>;

    /// Desired workloads for specific processes
    async fn desired_workloads_for(
        &self,
        process_guids: &[String],
    ) -> Result<Vec<DesiredLrp>, StateSourceError>;

    /// Every actual instance
    async fn actual_workloads(&self) -> Result<Vec<ActualLrp>, StateSourceError>;

    /// Domains the store vouches were fully reported this cycle
    async fn fresh_domains(&self) -> Result<DomainSet, StateSourceError>;
}

/// HTTP-backed state source
pub struct HttpStateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStateSource {
    /// Create a source against the given API base URL
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, StateSourceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, StateSourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StateSourceError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ClusterStateSource for HttpStateSource {
    async fn desired_workloads(&self) -> Result<Vec<DesiredLrp>, StateSourceError> {
        self.get_json("/v1/desired_workloads").await
    }

    async fn desired_workloads_for(
        &self,
        process_guids: &[String],
    ) -> Result<Vec<DesiredLrp>, StateSourceError> {
        let path = format!(
            "/v1/desired_workloads?process_guids={}",
            process_guids.join(",")
        );
        self.get_json(&path).await
    }

    async fn actual_workloads(&self) -> Result<Vec<ActualLrp>, StateSourceError> {
        self.get_json("/v1/actual_workloads").await
    }

    async fn fresh_domains(&self) -> Result<DomainSet, StateSourceError> {
        let domains: Vec<String> = self.get_json("/v1/domains").await?;
        Ok(domains.into_iter().collect())
    }
}
