//! Local allocation log CLI command

use anyhow::Result;
use broker_lib::{read_allocation_log, AllocationLogRecord};
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    color_provider, format_rate, format_timestamp, format_usd, print_info, print_json, print_rows,
    OutputFormat,
};

#[derive(Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "Time (UTC)")]
    time: String,
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
    #[tabled(rename = "Budget")]
    budget: String,
}

impl From<&AllocationLogRecord> for HistoryRow {
    fn from(record: &AllocationLogRecord) -> Self {
        Self {
            time: format_timestamp(record.timestamp),
            instance_id: record.allocation.instance_id.clone(),
            workload: record.request.workload_type.to_string(),
            provider: color_provider(record.allocation.provider),
            tier: record.allocation.specs.tier().to_string(),
            rate: format_rate(record.allocation.cost_per_hour),
            hours: format!("{}", record.request.duration),
            budget: format_usd(record.request.budget),
        }
    }
}

/// Show the records of a local allocation log
pub fn history(path: &Path, format: OutputFormat) -> Result<()> {
    let records = read_allocation_log(path)?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            print_info(&format!("Reading {}", path.display()));
            let rows: Vec<HistoryRow> = records.iter().map(HistoryRow::from).collect();
            print_rows(rows, "No allocation records found");
        }
    }

    Ok(())
}
