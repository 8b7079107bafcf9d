//! Cost optimization CLI command

use anyhow::Result;
use broker_lib::{OptimizationReport, RecommendationKind};
use colored::Colorize;

use crate::client::ApiClient;
use crate::output::{format_usd, print_json, print_success, print_warning, OutputFormat};

/// Show projected monthly spend and advice
pub async fn optimize(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: OptimizationReport = client.get("api/v1/optimize").await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &OptimizationReport) {
    println!("{}", "Cost Optimization".bold());
    println!("{}", "=".repeat(50));
    println!("Allocations:            {}", report.allocation_count);

    let total = format_usd(report.total_monthly_cost);
    let total = if report.is_over_budget() {
        total.red().to_string()
    } else {
        total.green().to_string()
    };
    println!("Projected monthly:      {}", total);
    println!("Budget limit:           {}", format_usd(report.budget_limit));
    println!();

    if report.recommendations.is_empty() {
        print_success("No recommendations");
        return;
    }

    println!("{}", "Recommendations".bold());
    println!("{}", "-".repeat(50));
    for recommendation in &report.recommendations {
        match recommendation.kind {
            RecommendationKind::OverBudget => print_warning(&recommendation.message),
            RecommendationKind::ConvertToReserved => {
                println!("  {} {}", "→".cyan(), recommendation.message)
            }
        }
    }
}
