//! Rate and policy table CLI command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, RatesResponse};
use crate::output::{color_priority, color_provider, format_rate, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct RateRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Rate")]
    rate: String,
}

#[derive(Tabled)]
struct PolicyRow {
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Min GPU GB")]
    min_gpu_memory: String,
    #[tabled(rename = "Template")]
    template: String,
    #[tabled(rename = "Priority")]
    priority: String,
}

/// Show the broker's rate table and workload policies
pub async fn rates(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: RatesResponse = client.get("api/v1/rates").await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rates: Vec<RateRow> = result
                .rates
                .iter()
                .map(|r| RateRow {
                    provider: color_provider(r.provider),
                    tier: r.tier.clone(),
                    rate: format_rate(r.cost_per_hour),
                })
                .collect();
            print_rows(rates, "No rates configured");
            println!();

            let policies: Vec<PolicyRow> = result
                .policies
                .iter()
                .map(|p| PolicyRow {
                    workload: p.workload_type.to_string(),
                    provider: color_provider(p.policy.provider),
                    tier: p
                        .policy
                        .gpu
                        .clone()
                        .or_else(|| p.policy.instance_type.clone())
                        .unwrap_or_else(|| "-".to_string()),
                    min_gpu_memory: p
                        .policy
                        .min_gpu_memory_gb
                        .map(|gb| gb.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    template: p.policy.template.clone().unwrap_or_else(|| "-".to_string()),
                    priority: color_priority(p.policy.priority),
                })
                .collect();
            print_rows(policies, "No workload policies configured");
        }
    }

    Ok(())
}
