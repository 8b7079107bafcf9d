//! Allocation decisions and the in-memory allocation state
//!
//! The allocator resolves a workload's policy, walks the downgrade chain
//! until a provider fits the budget, records the allocation and appends it
//! to the allocation log. The log is best effort: a failed write is reported
//! through `AllocationOutcome::persisted` and never undoes the allocation.

use crate::budget::{within_budget, DowngradeChain};
use crate::error::{BrokerError, BrokerResult};
use crate::models::{
    InstanceSpecs, Provider, ProviderKind, ResourceAllocation, ResourceRequest, WorkloadType,
};
use crate::observability::{BrokerMetrics, StructuredLogger};
use crate::optimizer::{CostOptimizer, OptimizationReport};
use crate::persistence::{AllocationLogRecord, AllocationSink};
use crate::policy::{PolicyRecord, WorkloadPolicyTable};
use crate::rates::RateTable;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Generates instance identifiers for new allocations
pub type IdGenerator = Box<dyn Fn(Provider, WorkloadType) -> String + Send + Sync>;

/// `{provider}-{workload}-{12 hex chars}`
pub fn random_instance_id(provider: Provider, workload: WorkloadType) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", provider, workload, &suffix[..12])
}

/// Allocation state keyed by instance identifier.
///
/// Entries are only ever inserted, never evicted, so the map grows for the
/// lifetime of the owning allocator.
#[derive(Debug, Default)]
pub struct AllocationStore {
    allocations: DashMap<String, ResourceAllocation>,
}

impl AllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an allocation whose identifier must not already be present
    pub fn insert_new(&self, allocation: ResourceAllocation) -> BrokerResult<()> {
        match self.allocations.entry(allocation.instance_id.clone()) {
            Entry::Occupied(entry) => Err(BrokerError::DuplicateInstanceId(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(allocation);
                Ok(())
            }
        }
    }

    pub fn get(&self, instance_id: &str) -> Option<ResourceAllocation> {
        self.allocations.get(instance_id).map(|r| r.clone())
    }

    /// Copy of every allocation, ordered by instance identifier
    pub fn snapshot(&self) -> Vec<ResourceAllocation> {
        let mut allocations: Vec<_> = self.allocations.iter().map(|r| r.value().clone()).collect();
        allocations.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        allocations
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Allocation plus whether its log record was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub allocation: ResourceAllocation,
    pub persisted: bool,
}

/// Provider and tier chosen for a request
#[derive(Debug, Clone, PartialEq)]
struct Selection {
    provider: Provider,
    tier: String,
    cost_per_hour: f64,
    downgrade_steps: u32,
}

/// Budget-aware allocator owning the allocation state
pub struct Allocator {
    rates: Arc<RateTable>,
    policies: Arc<WorkloadPolicyTable>,
    store: AllocationStore,
    sink: Arc<dyn AllocationSink>,
    id_generator: IdGenerator,
    metrics: BrokerMetrics,
    logger: StructuredLogger,
}

impl Allocator {
    pub fn new(
        rates: Arc<RateTable>,
        policies: Arc<WorkloadPolicyTable>,
        sink: Arc<dyn AllocationSink>,
    ) -> Self {
        Self {
            rates,
            policies,
            store: AllocationStore::new(),
            sink,
            id_generator: Box::new(random_instance_id),
            metrics: BrokerMetrics::new(),
            logger: StructuredLogger::new("broker"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn policies(&self) -> &WorkloadPolicyTable {
        &self.policies
    }

    /// Decide, record and log an allocation for `request`
    pub fn allocate(&self, request: &ResourceRequest) -> BrokerResult<AllocationOutcome> {
        let started = Instant::now();
        let result = self.try_allocate(request);
        self.metrics
            .observe_allocation_latency(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                self.metrics.inc_allocations(outcome.allocation.provider);
                self.metrics.set_active_allocations(self.store.len() as i64);
            }
            Err(e) => {
                self.metrics.inc_rejections(e.code());
                self.logger
                    .log_rejection(request.workload_type, e.code(), &e.to_string());
            }
        }

        result
    }

    fn try_allocate(&self, request: &ResourceRequest) -> BrokerResult<AllocationOutcome> {
        let policy = self.policies.policy(request.workload_type)?;
        request.validate()?;
        let selection = self.select(request, policy)?;

        let allocation = ResourceAllocation {
            provider: selection.provider,
            instance_id: (self.id_generator)(selection.provider, request.workload_type),
            workload_type: request.workload_type,
            cost_per_hour: selection.cost_per_hour,
            estimated_completion: request.duration_hours,
            specs: build_specs(selection.provider, &selection.tier, policy, request),
            created_at: chrono::Utc::now().timestamp(),
        };

        self.store.insert_new(allocation.clone())?;

        let persisted = match self.sink.append(&AllocationLogRecord::new(&allocation, request)) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.inc_persistence_failures();
                self.logger
                    .log_persistence_failure(&allocation.instance_id, &format!("{:#}", e));
                false
            }
        };

        self.logger.log_allocation(
            &allocation,
            policy.priority,
            selection.downgrade_steps,
            persisted,
        );

        Ok(AllocationOutcome {
            allocation,
            persisted,
        })
    }

    /// Walk the downgrade chain from the preferred provider and return the
    /// first provider whose projected cost fits the budget
    fn select(&self, request: &ResourceRequest, policy: &PolicyRecord) -> BrokerResult<Selection> {
        let mut cheapest_projected = f64::INFINITY;
        let mut previous: Option<(Provider, f64)> = None;

        for (steps, provider) in DowngradeChain::starting_at(policy.provider).enumerate() {
            let tier = policy.tier_for(provider)?;
            let rate = self.rates.rate(provider, tier)?;
            let projected = rate * request.duration_hours;

            if let Some((from, from_rate)) = previous {
                if rate > from_rate {
                    self.metrics.inc_costlier_downgrades();
                    self.logger.log_costlier_downgrade(
                        request.workload_type,
                        from,
                        from_rate,
                        provider,
                        rate,
                    );
                }
            }

            debug!(
                workload_type = %request.workload_type,
                provider = %provider,
                tier = %tier,
                projected_cost = projected,
                budget = request.budget_usd,
                "Evaluating provider"
            );

            if within_budget(projected, request.budget_usd) {
                return Ok(Selection {
                    provider,
                    tier: tier.to_string(),
                    cost_per_hour: rate,
                    downgrade_steps: steps as u32,
                });
            }

            cheapest_projected = cheapest_projected.min(projected);
            if let Some(next) = provider.downgrade() {
                self.metrics.inc_downgrade_steps();
                self.logger.log_downgrade(
                    request.workload_type,
                    provider,
                    next,
                    projected,
                    request.budget_usd,
                );
            }
            previous = Some((provider, rate));
        }

        Err(BrokerError::BudgetExceeded {
            workload: request.workload_type,
            budget: request.budget_usd,
            cheapest_projected,
        })
    }

    pub fn get(&self, instance_id: &str) -> Option<ResourceAllocation> {
        self.store.get(instance_id)
    }

    /// Snapshot of the allocation state
    pub fn allocations(&self) -> Vec<ResourceAllocation> {
        self.store.snapshot()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Run the optimizer over the current allocation state
    pub fn optimize(&self, optimizer: &CostOptimizer) -> OptimizationReport {
        let report = optimizer.optimize(&self.store.snapshot());
        self.metrics.set_projected_monthly_cost(report.total_monthly_cost);
        self.logger.log_optimization(&report);
        report
    }
}

fn build_specs(
    provider: Provider,
    tier: &str,
    policy: &PolicyRecord,
    request: &ResourceRequest,
) -> InstanceSpecs {
    match provider.kind() {
        ProviderKind::GeneralPurpose => InstanceSpecs::GeneralPurpose {
            instance_type: tier.to_string(),
            vcpu: request.vcpu_count,
            ram_gb: request.ram_gb,
            storage_gb: request.storage_gb,
        },
        ProviderKind::GpuMarketplace => InstanceSpecs::GpuMarketplace {
            gpu: tier.to_string(),
            template: policy.template.clone(),
            storage_gb: request.storage_gb,
            reserved: provider == Provider::VastaiReserved,
        },
    }
}
