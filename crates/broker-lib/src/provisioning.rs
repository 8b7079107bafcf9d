//! Contract with the external provisioning service
//!
//! The broker decides where a workload runs; creating the instance belongs to
//! a provider-specific service behind [`ProvisioningService`]. Calls are
//! bounded by a per-attempt timeout and only transient failures are retried.

use crate::models::{InstanceSpecs, Provider, ResourceAllocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What to create on the provider side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub instance_id: String,
    pub provider: Provider,
    pub tier: String,
    pub specs: InstanceSpecs,
}

impl ProvisionRequest {
    pub fn from_allocation(allocation: &ResourceAllocation) -> Self {
        Self {
            instance_id: allocation.instance_id.clone(),
            provider: allocation.provider,
            tier: allocation.specs.tier().to_string(),
            specs: allocation.specs.clone(),
        }
    }
}

/// Handle to an instance created by the provisioning service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHandle {
    pub instance_id: String,
    pub provider: Provider,
    /// Identifier assigned by the provider
    pub external_id: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProvisionError {
    /// Worth retrying (rate limits, capacity, network)
    #[error("transient provisioning failure: {0}")]
    Transient(String),

    #[error("provisioning rejected: {0}")]
    Permanent(String),

    #[error("provisioning gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::Transient(_))
    }
}

#[async_trait]
pub trait ProvisioningService: Send + Sync {
    async fn provision(&self, request: &ProvisionRequest) -> Result<InstanceHandle, ProvisionError>;
}

/// Provisioner that creates nothing and answers immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunProvisioner;

#[async_trait]
impl ProvisioningService for DryRunProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<InstanceHandle, ProvisionError> {
        debug!(
            instance_id = %request.instance_id,
            provider = %request.provider,
            tier = %request.tier,
            "Dry-run provisioning"
        );
        Ok(InstanceHandle {
            instance_id: request.instance_id.clone(),
            provider: request.provider,
            external_id: format!("dry-run-{}", request.instance_id),
            dry_run: true,
        })
    }
}

/// Timeout and backoff settings for provisioning calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub attempts: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the initial backoff
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }
}

/// Provision with a per-attempt timeout, retrying transient failures.
///
/// Timeouts count as transient. A permanent failure is returned as is.
pub async fn provision_with_retry(
    service: &dyn ProvisioningService,
    request: &ProvisionRequest,
    policy: &RetryPolicy,
) -> Result<InstanceHandle, ProvisionError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.timeout, service.provision(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Transient(format!(
                "timed out after {:?}",
                policy.timeout
            ))),
        };

        match result {
            Ok(handle) => {
                info!(
                    instance_id = %request.instance_id,
                    external_id = %handle.external_id,
                    attempt = attempt,
                    "Instance provisioned"
                );
                return Ok(handle);
            }
            Err(e) if e.is_transient() => {
                last_error = e.to_string();
                if attempt < attempts {
                    let backoff = policy.backoff_for(attempt);
                    warn!(
                        instance_id = %request.instance_id,
                        attempt = attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Provisioning attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => {
                warn!(
                    instance_id = %request.instance_id,
                    error = %e,
                    "Provisioning rejected"
                );
                return Err(e);
            }
        }
    }

    Err(ProvisionError::Exhausted {
        attempts,
        last_error,
    })
}
