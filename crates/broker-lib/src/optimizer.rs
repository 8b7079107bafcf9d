//! Cost projection and tier conversion advice
//!
//! Runs read-only over a snapshot of the allocation state. Projections assume
//! every allocation runs around the clock for a 30 day month, regardless of
//! the duration that was requested.

use crate::models::{Provider, ResourceAllocation};
use serde::{Deserialize, Serialize};

/// Hours in the projected billing month
pub const HOURS_PER_MONTH: f64 = 24.0 * 30.0;

/// Monthly ceiling used when none is configured
pub const DEFAULT_BUDGET_LIMIT: f64 = 1500.0;

/// On-demand usage above this many hours per day is advised to move to the
/// reserved tier.
///
/// Placeholder heuristic. It is compared against `estimated_completion`,
/// which is the total requested job duration and not observed daily usage;
/// a break-even computation from the two tier rates would replace it.
pub const RESERVED_CONVERSION_DAILY_HOURS: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    OverBudget,
    ConvertToReserved,
}

/// A single piece of advice from an optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub message: String,
}

impl Recommendation {
    pub fn over_budget(total_monthly_cost: f64, budget_limit: f64) -> Self {
        Self {
            kind: RecommendationKind::OverBudget,
            instance_id: None,
            message: format!(
                "Monthly cost ${:.2} exceeds budget ${:.2}",
                total_monthly_cost, budget_limit
            ),
        }
    }

    pub fn convert_to_reserved(instance_id: &str, daily_hours: f64) -> Self {
        Self {
            kind: RecommendationKind::ConvertToReserved,
            instance_id: Some(instance_id.to_string()),
            message: format!(
                "Convert {} to reserved (uses {}h/day)",
                instance_id, daily_hours
            ),
        }
    }
}

/// Result of an optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub total_monthly_cost: f64,
    pub budget_limit: f64,
    pub allocation_count: usize,
    pub recommendations: Vec<Recommendation>,
}

impl OptimizationReport {
    /// Plain recommendation texts
    pub fn messages(&self) -> Vec<String> {
        self.recommendations.iter().map(|r| r.message.clone()).collect()
    }

    pub fn is_over_budget(&self) -> bool {
        self.total_monthly_cost > self.budget_limit
    }
}

/// Projects monthly spend against a budget ceiling
#[derive(Debug, Clone)]
pub struct CostOptimizer {
    budget_limit: f64,
}

impl Default for CostOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET_LIMIT)
    }
}

impl CostOptimizer {
    pub fn new(budget_limit: f64) -> Self {
        Self { budget_limit }
    }

    pub fn budget_limit(&self) -> f64 {
        self.budget_limit
    }

    /// Projected monthly spend of running every allocation continuously
    pub fn monthly_cost(allocations: &[ResourceAllocation]) -> f64 {
        allocations
            .iter()
            .map(|a| a.cost_per_hour * HOURS_PER_MONTH)
            .sum()
    }

    /// Build the report for a set of allocations. Never fails.
    pub fn optimize(&self, allocations: &[ResourceAllocation]) -> OptimizationReport {
        let total_monthly_cost = Self::monthly_cost(allocations);
        let mut recommendations = Vec::new();

        if total_monthly_cost > self.budget_limit {
            recommendations.push(Recommendation::over_budget(
                total_monthly_cost,
                self.budget_limit,
            ));
        }

        recommendations.extend(
            allocations
                .iter()
                .filter(|a| a.provider == Provider::VastaiOndemand)
                .filter(|a| a.estimated_completion > RESERVED_CONVERSION_DAILY_HOURS)
                .map(|a| Recommendation::convert_to_reserved(&a.instance_id, a.estimated_completion)),
        );

        OptimizationReport {
            total_monthly_cost,
            budget_limit: self.budget_limit,
            allocation_count: allocations.len(),
            recommendations,
        }
    }
}
