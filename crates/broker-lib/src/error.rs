//! Error types for allocation decisions

use crate::models::{Provider, WorkloadType};
use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors returned by the allocation engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// No policy is registered for the workload type.
    #[error("No allocation policy for workload type: {0}")]
    UnknownWorkload(WorkloadType),

    /// Every provider in the downgrade chain exceeds the budget.
    #[error(
        "Budget ${budget:.2} too low for {workload}: cheapest option along the downgrade chain costs ${cheapest_projected:.2}"
    )]
    BudgetExceeded {
        workload: WorkloadType,
        budget: f64,
        cheapest_projected: f64,
    },

    /// A policy references a (provider, tier) pair that has no rate.
    #[error("No hourly rate for tier '{tier}' on provider {provider}")]
    RateNotFound { provider: Provider, tier: String },

    /// Generated instance identifier is already in use.
    #[error("Instance identifier collision: {0}")]
    DuplicateInstanceId(String),

    /// Request fields cannot be priced.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Policy table is inconsistent with the rate table.
    #[error("Policy validation failed: {0}")]
    PolicyValidation(String),
}

impl BrokerError {
    /// Short machine-readable code used in API responses and metric labels
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownWorkload(_) => "unknown_workload",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::RateNotFound { .. } => "rate_not_found",
            Self::DuplicateInstanceId(_) => "duplicate_instance_id",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PolicyValidation(_) => "policy_validation",
        }
    }

    /// True for defects in configuration or bookkeeping rather than the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::RateNotFound { .. } | Self::DuplicateInstanceId(_) | Self::PolicyValidation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exceeded_message() {
        let err = BrokerError::BudgetExceeded {
            workload: WorkloadType::AiTraining,
            budget: 5.0,
            cheapest_projected: 5.76,
        };
        assert_eq!(
            err.to_string(),
            "Budget $5.00 too low for ai_training: cheapest option along the downgrade chain costs $5.76"
        );
        assert_eq!(err.code(), "budget_exceeded");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_internal_errors() {
        let err = BrokerError::RateNotFound {
            provider: Provider::VastaiOndemand,
            tier: "RTX 5090".to_string(),
        };
        assert!(err.is_internal());
        assert!(BrokerError::DuplicateInstanceId("x".into()).is_internal());
        assert!(!BrokerError::UnknownWorkload(WorkloadType::Development).is_internal());
    }
}
