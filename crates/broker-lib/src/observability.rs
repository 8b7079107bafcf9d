//! Observability infrastructure for the broker
//!
//! Provides:
//! - Prometheus metrics (allocation outcomes, downgrades, latency, projected spend)
//! - Structured JSON logging with tracing

use crate::models::{Priority, Provider, ResourceAllocation, WorkloadType};
use crate::optimizer::OptimizationReport;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for allocation decision latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<BrokerMetricsInner> = OnceLock::new();

struct BrokerMetricsInner {
    allocations_total: IntCounterVec,
    rejections_total: IntCounterVec,
    downgrade_steps_total: IntCounter,
    costlier_downgrades_total: IntCounter,
    persistence_failures_total: IntCounter,
    allocation_latency_seconds: Histogram,
    active_allocations: IntGauge,
    projected_monthly_cost: Gauge,
}

impl BrokerMetricsInner {
    fn new() -> Self {
        Self {
            allocations_total: register_int_counter_vec!(
                "broker_allocations_total",
                "Successful allocations by provider",
                &["provider"]
            )
            .expect("Failed to register allocations_total"),

            rejections_total: register_int_counter_vec!(
                "broker_rejections_total",
                "Rejected allocation requests by reason",
                &["reason"]
            )
            .expect("Failed to register rejections_total"),

            downgrade_steps_total: register_int_counter!(
                "broker_downgrade_steps_total",
                "Provider downgrade steps taken because of budget"
            )
            .expect("Failed to register downgrade_steps_total"),

            costlier_downgrades_total: register_int_counter!(
                "broker_costlier_downgrades_total",
                "Downgrade steps that moved to a higher hourly rate"
            )
            .expect("Failed to register costlier_downgrades_total"),

            persistence_failures_total: register_int_counter!(
                "broker_persistence_failures_total",
                "Allocation log writes that failed"
            )
            .expect("Failed to register persistence_failures_total"),

            allocation_latency_seconds: register_histogram!(
                "broker_allocation_latency_seconds",
                "Time spent deciding and recording an allocation",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register allocation_latency_seconds"),

            active_allocations: register_int_gauge!(
                "broker_active_allocations",
                "Allocations currently held in memory"
            )
            .expect("Failed to register active_allocations"),

            projected_monthly_cost: register_gauge!(
                "broker_projected_monthly_cost_usd",
                "Projected monthly spend from the last optimization run"
            )
            .expect("Failed to register projected_monthly_cost"),
        }
    }
}

/// Broker metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance. Clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct BrokerMetrics {
    _private: (),
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BrokerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BrokerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_allocations(&self, provider: Provider) {
        self.inner()
            .allocations_total
            .with_label_values(&[provider.as_str()])
            .inc();
    }

    pub fn inc_rejections(&self, reason: &str) {
        self.inner().rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_downgrade_steps(&self) {
        self.inner().downgrade_steps_total.inc();
    }

    pub fn inc_costlier_downgrades(&self) {
        self.inner().costlier_downgrades_total.inc();
    }

    pub fn costlier_downgrades_total(&self) -> u64 {
        self.inner().costlier_downgrades_total.get()
    }

    pub fn inc_persistence_failures(&self) {
        self.inner().persistence_failures_total.inc();
    }

    pub fn observe_allocation_latency(&self, duration_secs: f64) {
        self.inner().allocation_latency_seconds.observe(duration_secs);
    }

    pub fn set_active_allocations(&self, count: i64) {
        self.inner().active_allocations.set(count);
    }

    pub fn set_projected_monthly_cost(&self, usd: f64) {
        self.inner().projected_monthly_cost.set(usd);
    }
}

/// Structured logger for broker events
///
/// Consistent JSON-formatted logging for allocations, rejections and
/// optimization runs.
#[derive(Clone)]
pub struct StructuredLogger {
    instance_name: String,
}

impl StructuredLogger {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
        }
    }

    /// Log a successful allocation
    pub fn log_allocation(
        &self,
        allocation: &ResourceAllocation,
        priority: Priority,
        downgrade_steps: u32,
        persisted: bool,
    ) {
        info!(
            event = "allocation_created",
            broker = %self.instance_name,
            instance_id = %allocation.instance_id,
            workload_type = %allocation.workload_type,
            provider = %allocation.provider,
            tier = %allocation.specs.tier(),
            cost_per_hour = allocation.cost_per_hour,
            estimated_hours = allocation.estimated_completion,
            priority = %priority,
            downgrade_steps = downgrade_steps,
            persisted = persisted,
            "Allocated instance"
        );
    }

    /// Log a rejected request
    pub fn log_rejection(&self, workload: WorkloadType, reason: &str, details: &str) {
        warn!(
            event = "allocation_rejected",
            broker = %self.instance_name,
            workload_type = %workload,
            reason = %reason,
            details = %details,
            "Allocation request rejected"
        );
    }

    /// Log one step down the provider chain
    pub fn log_downgrade(
        &self,
        workload: WorkloadType,
        from: Provider,
        to: Provider,
        projected_cost: f64,
        budget: f64,
    ) {
        info!(
            event = "provider_downgraded",
            broker = %self.instance_name,
            workload_type = %workload,
            from = %from,
            to = %to,
            projected_cost = projected_cost,
            budget = budget,
            "Budget too low, trying lower tier"
        );
    }

    /// Log a downgrade step that raised the hourly rate
    pub fn log_costlier_downgrade(
        &self,
        workload: WorkloadType,
        from: Provider,
        from_rate: f64,
        to: Provider,
        to_rate: f64,
    ) {
        warn!(
            event = "costlier_downgrade",
            broker = %self.instance_name,
            workload_type = %workload,
            from = %from,
            from_rate = from_rate,
            to = %to,
            to_rate = to_rate,
            "Downgrade moved to a higher hourly rate"
        );
    }

    /// Log an allocation log write failure
    pub fn log_persistence_failure(&self, instance_id: &str, error: &str) {
        warn!(
            event = "allocation_log_failed",
            broker = %self.instance_name,
            instance_id = %instance_id,
            error = %error,
            "Failed to persist allocation record, allocation kept in memory"
        );
    }

    /// Log an optimization run
    pub fn log_optimization(&self, report: &OptimizationReport) {
        info!(
            event = "optimization_run",
            broker = %self.instance_name,
            allocations = report.allocation_count,
            total_monthly_cost = report.total_monthly_cost,
            budget_limit = report.budget_limit,
            recommendations = report.recommendations.len(),
            "Cost optimization completed"
        );
    }

    /// Log broker startup
    pub fn log_startup(&self, version: &str, rate_entries: usize, policies: usize) {
        info!(
            event = "broker_started",
            broker = %self.instance_name,
            broker_version = %version,
            rate_entries = rate_entries,
            policies = policies,
            "Resource broker started"
        );
    }

    /// Log broker shutdown
    pub fn log_shutdown(&self, reason: &str, allocations: usize) {
        info!(
            event = "broker_shutdown",
            broker = %self.instance_name,
            reason = %reason,
            allocations = allocations,
            "Resource broker shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_metrics_creation() {
        let metrics = BrokerMetrics::new();

        metrics.inc_allocations(Provider::Alibaba);
        metrics.inc_rejections("budget_exceeded");
        metrics.inc_downgrade_steps();
        metrics.inc_costlier_downgrades();
        metrics.inc_persistence_failures();
        metrics.observe_allocation_latency(0.0002);
        metrics.set_active_allocations(3);
        metrics.set_projected_monthly_cost(547.2);

        // A second handle shares the registered metrics
        let again = BrokerMetrics::new();
        again.inc_allocations(Provider::VastaiReserved);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("broker-test");
        assert_eq!(logger.instance_name, "broker-test");
    }
}
