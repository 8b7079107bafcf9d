//! Allocation CLI commands

use anyhow::Result;
use broker_lib::{ResourceAllocation, ResourceRequest};
use colored::Colorize;
use tabled::Tabled;

use crate::client::{AllocateRequest, AllocateResponse, AllocationList, ApiClient};
use crate::output::{
    color_provider, format_rate, format_usd, print_json, print_rows, print_success,
    print_warning, OutputFormat,
};

/// Row for allocations table
#[derive(Tabled)]
pub struct AllocationRow {
    #[tabled(rename = "Instance")]
    instance_id: String,
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Hours")]
    hours: String,
    #[tabled(rename = "Projected")]
    projected: String,
}

impl From<&ResourceAllocation> for AllocationRow {
    fn from(a: &ResourceAllocation) -> Self {
        Self {
            instance_id: a.instance_id.clone(),
            workload: a.workload_type.to_string(),
            provider: color_provider(a.provider),
            tier: a.specs.tier().to_string(),
            rate: format_rate(a.cost_per_hour),
            hours: format!("{}", a.estimated_completion),
            projected: format_usd(a.cost_per_hour * a.estimated_completion),
        }
    }
}

/// Request an allocation from the broker
pub async fn allocate(
    client: &ApiClient,
    request: ResourceRequest,
    provision: bool,
    format: OutputFormat,
) -> Result<()> {
    let body = AllocateRequest { request, provision };
    let result: AllocateResponse = client.post("api/v1/allocations", &body).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let allocation = &result.allocation;
            print_success(&format!(
                "Allocated {} on {}",
                allocation.instance_id.bold(),
                color_provider(allocation.provider)
            ));
            print_rows(vec![AllocationRow::from(allocation)], "No allocation returned");

            if !result.persisted {
                print_warning("Allocation was not written to the allocation log");
            }
            if let Some(handle) = &result.instance_handle {
                let mode = if handle.dry_run { " (dry run)" } else { "" };
                print_success(&format!("Provisioned as {}{}", handle.external_id, mode));
            }
            if let Some(error) = &result.provisioning_error {
                print_warning(&format!("Provisioning failed: {}", error));
            }
        }
    }

    Ok(())
}

/// List allocations held by the broker
pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: AllocationList = client.get("api/v1/allocations").await?;

    match format {
        OutputFormat::Json => print_json(&result.allocations)?,
        OutputFormat::Table => {
            let rows: Vec<AllocationRow> = result.allocations.iter().map(AllocationRow::from).collect();
            let empty = rows.is_empty();
            print_rows(rows, "No allocations found");
            if !empty {
                println!("\nTotal: {} allocations", result.total);
            }
        }
    }

    Ok(())
}
