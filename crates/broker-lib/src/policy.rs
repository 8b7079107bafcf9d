//! Workload placement policies
//!
//! Maps each workload type to its preferred provider and tier. The table is
//! built once at startup and validated against the rate table so that every
//! tier reachable through the downgrade chain can be priced.

use crate::error::{BrokerError, BrokerResult};
use crate::models::{Priority, Provider, ProviderKind, WorkloadType};
use crate::rates::{RateTable, DEFAULT_GENERAL_PURPOSE_TIER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placement policy for one workload type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Provider tried first
    pub provider: Provider,
    /// GPU model used on marketplace providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
    /// Instance type used on the general-purpose cloud
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_gpu_memory_gb: Option<u32>,
    /// Marketplace image template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub priority: Priority,
}

impl PolicyRecord {
    /// GPU workload placed on a marketplace provider
    pub fn gpu(
        provider: Provider,
        gpu: &str,
        min_gpu_memory_gb: u32,
        template: &str,
        priority: Priority,
    ) -> Self {
        Self {
            provider,
            gpu: Some(gpu.to_string()),
            instance_type: None,
            min_gpu_memory_gb: Some(min_gpu_memory_gb),
            template: Some(template.to_string()),
            priority,
        }
    }

    /// CPU workload placed on the general-purpose cloud
    pub fn instance(instance_type: &str, priority: Priority) -> Self {
        Self {
            provider: Provider::Alibaba,
            gpu: None,
            instance_type: Some(instance_type.to_string()),
            min_gpu_memory_gb: None,
            template: None,
            priority,
        }
    }

    /// Tier name to price on `provider`
    pub fn tier_for(&self, provider: Provider) -> BrokerResult<&str> {
        match provider.kind() {
            ProviderKind::GpuMarketplace => {
                self.gpu.as_deref().ok_or_else(|| BrokerError::RateNotFound {
                    provider,
                    tier: "<no gpu in policy>".to_string(),
                })
            }
            ProviderKind::GeneralPurpose => Ok(self
                .instance_type
                .as_deref()
                .unwrap_or(DEFAULT_GENERAL_PURPOSE_TIER)),
        }
    }
}

/// One policy, flattened for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub workload_type: WorkloadType,
    #[serde(flatten)]
    pub policy: PolicyRecord,
}

/// Static mapping from workload type to placement policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadPolicyTable {
    policies: BTreeMap<WorkloadType, PolicyRecord>,
}

impl WorkloadPolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in policies. `development` is intentionally unregistered.
    pub fn standard() -> Self {
        Self::new()
            .with_policy(
                WorkloadType::AiTraining,
                PolicyRecord::gpu(Provider::VastaiReserved, "RTX 5090", 24, "au", Priority::High),
            )
            .with_policy(
                WorkloadType::AiInference,
                PolicyRecord::gpu(Provider::VastaiReserved, "RTX 5090", 16, "au", Priority::High),
            )
            .with_policy(
                WorkloadType::MediaRender,
                PolicyRecord::gpu(
                    Provider::VastaiReserved,
                    "RTX 4090",
                    12,
                    "xurt",
                    Priority::Medium,
                ),
            )
            .with_policy(
                WorkloadType::Mining,
                PolicyRecord::gpu(Provider::VastaiOndemand, "RTX 3090", 24, "mining", Priority::Low),
            )
            .with_policy(
                WorkloadType::Database,
                PolicyRecord::instance("ecs.r6.large", Priority::High),
            )
            .with_policy(
                WorkloadType::Monitoring,
                PolicyRecord::instance("ecs.g6.large", Priority::Medium),
            )
    }

    pub fn with_policy(mut self, workload: WorkloadType, policy: PolicyRecord) -> Self {
        self.policies.insert(workload, policy);
        self
    }

    /// Policy for a workload type
    pub fn policy(&self, workload: WorkloadType) -> BrokerResult<&PolicyRecord> {
        self.policies
            .get(&workload)
            .ok_or(BrokerError::UnknownWorkload(workload))
    }

    pub fn entries(&self) -> Vec<PolicyEntry> {
        self.policies
            .iter()
            .map(|(workload_type, policy)| PolicyEntry {
                workload_type: *workload_type,
                policy: policy.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Check that every (provider, tier) reachable from a policy through the
    /// downgrade chain has a rate
    pub fn validate(&self, rates: &RateTable) -> BrokerResult<()> {
        let mut missing = Vec::new();

        for (workload, policy) in &self.policies {
            let mut provider = Some(policy.provider);
            while let Some(current) = provider {
                match policy.tier_for(current) {
                    Ok(tier) if rates.contains(current, tier) => {}
                    Ok(tier) => missing.push(format!("{} -> {} '{}'", workload, current, tier)),
                    Err(_) => missing.push(format!("{} -> {} (no gpu set)", workload, current)),
                }
                provider = current.downgrade();
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::PolicyValidation(format!(
                "unpriced tiers: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_policies_validate_against_standard_rates() {
        let policies = WorkloadPolicyTable::standard();
        assert!(policies.validate(&RateTable::standard()).is_ok());
        assert_eq!(policies.len(), 6);
    }

    #[test]
    fn test_development_is_unregistered() {
        let policies = WorkloadPolicyTable::standard();
        assert_eq!(
            policies.policy(WorkloadType::Development).unwrap_err(),
            BrokerError::UnknownWorkload(WorkloadType::Development)
        );
    }

    #[test]
    fn test_policy_lookup_is_idempotent() {
        let policies = WorkloadPolicyTable::standard();
        let first = policies.policy(WorkloadType::Mining).unwrap().clone();
        let second = policies.policy(WorkloadType::Mining).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.provider, Provider::VastaiOndemand);
    }

    #[test]
    fn test_tier_resolution_by_provider_kind() {
        let training = PolicyRecord::gpu(Provider::VastaiReserved, "RTX 5090", 24, "au", Priority::High);
        assert_eq!(training.tier_for(Provider::VastaiReserved).unwrap(), "RTX 5090");
        assert_eq!(training.tier_for(Provider::VastaiOndemand).unwrap(), "RTX 5090");
        assert_eq!(
            training.tier_for(Provider::Alibaba).unwrap(),
            DEFAULT_GENERAL_PURPOSE_TIER
        );

        let database = PolicyRecord::instance("ecs.r6.large", Priority::High);
        assert_eq!(database.tier_for(Provider::Alibaba).unwrap(), "ecs.r6.large");
        assert!(database.tier_for(Provider::VastaiOndemand).is_err());
    }

    #[test]
    fn test_validate_reports_unpriced_downgrade_tier() {
        let rates = RateTable::new()
            .with_rate(Provider::VastaiReserved, "RTX 5090", 0.36)
            .with_rate(Provider::Alibaba, "ecs.g6.large", 0.12);
        let policies = WorkloadPolicyTable::new().with_policy(
            WorkloadType::AiTraining,
            PolicyRecord::gpu(Provider::VastaiReserved, "RTX 5090", 24, "au", Priority::High),
        );

        let err = policies.validate(&rates).unwrap_err();
        match err {
            BrokerError::PolicyValidation(msg) => {
                assert!(msg.contains("vastai_ondemand 'RTX 5090'"), "{}", msg)
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
