//! Hybrid Resource Broker
//!
//! Places workloads on a general-purpose cloud or a GPU marketplace within a
//! budget and serves allocations and cost advice over HTTP.

use anyhow::{Context, Result};
use broker_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    Allocator, CostOptimizer, DryRunProvisioner, WorkloadPolicyTable,
};
use hybrid_broker::{api, config::BrokerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BROKER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hybrid-broker");

    let config = BrokerConfig::load()?;
    info!(
        api_port = config.api_port,
        budget_limit = config.budget_limit,
        auto_scaling = config.auto_scaling,
        allocation_log = %config.allocation_log_path,
        "Broker configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ALLOCATOR).await;
    health_registry.register(components::ALLOCATION_LOG).await;
    health_registry.register(components::PROVISIONER).await;

    // Every tier reachable from a policy must be priced before serving
    let rates = config
        .build_rate_table()
        .context("Invalid hourly_rates configuration")?;
    let policies = WorkloadPolicyTable::standard();
    if let Err(e) = policies.validate(&rates) {
        error!(error = %e, "Policy table references unpriced tiers");
        return Err(e).context("Policy validation failed");
    }

    let logger = StructuredLogger::new(format!("broker-{}", config.api_port));
    logger.log_startup(BROKER_VERSION, rates.len(), policies.len());

    let allocator = Arc::new(
        Allocator::new(Arc::new(rates), Arc::new(policies), config.build_sink())
            .with_logger(logger.clone()),
    );

    let app_state = Arc::new(api::AppState::new(
        allocator.clone(),
        CostOptimizer::new(config.budget_limit),
        Arc::new(DryRunProvisioner),
        config.retry_policy(),
        health_registry.clone(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server stopped"),
                Ok(Err(e)) => return Err(e).context("API server failed"),
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received", allocator.len());
        }
    }

    info!("Shutting down");
    Ok(())
}
