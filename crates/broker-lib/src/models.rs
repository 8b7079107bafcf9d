//! Core data models for the resource broker

use crate::error::{BrokerError, BrokerResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of job submitted for allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    AiTraining,
    AiInference,
    MediaRender,
    Mining,
    Development,
    Database,
    Monitoring,
}

impl WorkloadType {
    pub const ALL: [WorkloadType; 7] = [
        WorkloadType::AiTraining,
        WorkloadType::AiInference,
        WorkloadType::MediaRender,
        WorkloadType::Mining,
        WorkloadType::Development,
        WorkloadType::Database,
        WorkloadType::Monitoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiTraining => "ai_training",
            Self::AiInference => "ai_inference",
            Self::MediaRender => "media_render",
            Self::Mining => "mining",
            Self::Development => "development",
            Self::Database => "database",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == normalized)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|w| w.as_str()).collect();
                format!("unknown workload type '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Whether a provider sells general-purpose instances or marketplace GPUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GeneralPurpose,
    GpuMarketplace,
}

/// Compute source an allocation can land on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// General-purpose cloud (ECS instance types)
    Alibaba,
    /// Reserved GPU marketplace tier
    VastaiReserved,
    /// On-demand GPU marketplace tier
    VastaiOndemand,
}

impl Provider {
    pub const ALL: [Provider; 3] = [
        Provider::VastaiReserved,
        Provider::VastaiOndemand,
        Provider::Alibaba,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alibaba => "alibaba",
            Self::VastaiReserved => "vastai_reserved",
            Self::VastaiOndemand => "vastai_ondemand",
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Alibaba => ProviderKind::GeneralPurpose,
            Self::VastaiReserved | Self::VastaiOndemand => ProviderKind::GpuMarketplace,
        }
    }

    /// Next provider to try when the budget does not cover this one.
    ///
    /// The order is fixed (reserved, on-demand, general-purpose) and is not
    /// re-derived from actual rates, so a step can land on a pricier tier.
    pub fn downgrade(&self) -> Option<Provider> {
        match self {
            Self::VastaiReserved => Some(Self::VastaiOndemand),
            Self::VastaiOndemand => Some(Self::Alibaba),
            Self::Alibaba => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

/// Scheduling priority attached to a workload policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// A single allocation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub workload_type: WorkloadType,
    pub gpu_memory_gb: u32,
    pub vcpu_count: u32,
    pub ram_gb: u32,
    pub storage_gb: u32,
    pub duration_hours: f64,
    pub budget_usd: f64,
}

impl ResourceRequest {
    /// Reject durations and budgets that cannot be priced
    pub fn validate(&self) -> BrokerResult<()> {
        if !self.duration_hours.is_finite() || self.duration_hours < 0.0 {
            return Err(BrokerError::InvalidRequest(format!(
                "duration_hours must be a non-negative number, got {}",
                self.duration_hours
            )));
        }
        if !self.budget_usd.is_finite() || self.budget_usd < 0.0 {
            return Err(BrokerError::InvalidRequest(format!(
                "budget_usd must be a non-negative number, got {}",
                self.budget_usd
            )));
        }
        Ok(())
    }
}

/// Instance description sent to the provider, by provider kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstanceSpecs {
    GeneralPurpose {
        #[serde(rename = "type")]
        instance_type: String,
        vcpu: u32,
        #[serde(rename = "ram")]
        ram_gb: u32,
        #[serde(rename = "storage")]
        storage_gb: u32,
    },
    GpuMarketplace {
        gpu: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        #[serde(rename = "storage")]
        storage_gb: u32,
        /// True on the reserved tier, false on on-demand
        reserved: bool,
    },
}

impl InstanceSpecs {
    /// Instance type or GPU model this spec was priced at
    pub fn tier(&self) -> &str {
        match self {
            Self::GeneralPurpose { instance_type, .. } => instance_type,
            Self::GpuMarketplace { gpu, .. } => gpu,
        }
    }
}

/// Result of a successful allocation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub provider: Provider,
    pub instance_id: String,
    pub workload_type: WorkloadType,
    pub cost_per_hour: f64,
    /// Requested duration in hours
    pub estimated_completion: f64,
    pub specs: InstanceSpecs,
    pub created_at: i64,
}
