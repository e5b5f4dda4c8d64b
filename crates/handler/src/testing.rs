//! In-memory test double for the cluster state source

use std::sync::Mutex;

use async_trait::async_trait;
use beacon_protocol::{ActualLrp, DesiredLrp, DomainSet};

use crate::source::{ClusterStateSource, StateSourceError};

/// State source backed by plain vectors
///
/// Shared across tasks via `Arc`; setters replace the whole collection.
#[derive(Debug, Default)]
pub struct InMemoryStateSource {
    desired: Mutex<Vec<DesiredLrp>>,
    actuals: Mutex<Vec<ActualLrp>>,
    domains: Mutex<Vec<String>>,
}

impl InMemoryStateSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the desired workloads
    pub fn set_desired(&self, desired: Vec<DesiredLrp>) {
        *self.desired.lock().unwrap_or_else(|e| e.into_inner()) = desired;
    }

    /// Replace the actual instances
    pub fn set_actuals(&self, actuals: Vec<ActualLrp>) {
        *self.actuals.lock().unwrap_or_else(|e| e.into_inner()) = actuals;
    }

    /// Replace the fresh domains
    pub fn set_domains(&self, domains: Vec<String>) {
        *self.domains.lock().unwrap_or_else(|e| e.into_inner()) = domains;
    }
}

#[async_trait]
impl ClusterStateSource for InMemoryStateSource {
    async fn desired_workloads(&self) -> Result<Vec<DesiredLrp>, StateSourceError> {
        Ok(self
            .desired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn desired_workloads_for(
        &self,
        process_guids: &[String],
    ) -> Result<Vec<DesiredLrp>, StateSourceError> {
        Ok(self
            .desired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|workload| process_guids.contains(&workload.process_guid))
            .cloned()
            .collect())
    }

    async fn actual_workloads(&self) -> Result<Vec<ActualLrp>, StateSourceError> {
        Ok(self
            .actuals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn fresh_domains(&self) -> Result<DomainSet, StateSourceError> {
        Ok(self
            .domains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect())
    }
}
