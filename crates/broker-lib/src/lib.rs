//! Decision engine for the hybrid resource broker
//!
//! This crate provides the core functionality for:
//! - Rate and workload policy lookup
//! - Budget evaluation and provider downgrade
//! - Allocation bookkeeping and the append-only allocation log
//! - Monthly cost projection and tier conversion advice
//! - Provisioning contract, health checks and observability

pub mod allocator;
pub mod budget;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod optimizer;
pub mod persistence;
pub mod policy;
pub mod provisioning;
pub mod rates;

pub use allocator::{AllocationOutcome, AllocationStore, Allocator};
pub use error::{BrokerError, BrokerResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{BrokerMetrics, StructuredLogger};
pub use optimizer::{CostOptimizer, OptimizationReport, Recommendation, RecommendationKind};
pub use persistence::{read_allocation_log, AllocationLogRecord, AllocationSink, JsonlAllocationLog, NullSink};
pub use policy::{PolicyRecord, WorkloadPolicyTable};
pub use provisioning::{
    provision_with_retry, DryRunProvisioner, InstanceHandle, ProvisionError, ProvisionRequest,
    ProvisioningService, RetryPolicy,
};
pub use rates::{RateOverrides, RateTable};
