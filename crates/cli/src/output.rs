//! Output formatting utilities

use broker_lib::{Priority, Provider};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print rows as a rounded table, or a warning when there are none
pub fn print_rows<R: Tabled>(rows: Vec<R>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print any value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a USD amount
pub fn format_usd(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Format an hourly rate, keeping sub-cent precision
pub fn format_rate(cost_per_hour: f64) -> String {
    format!("${:.3}/h", cost_per_hour)
}

/// Format a Unix timestamp in seconds as UTC
pub fn format_timestamp(seconds: f64) -> String {
    chrono::DateTime::from_timestamp_millis((seconds * 1000.0) as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Color provider names by tier
pub fn color_provider(provider: Provider) -> String {
    match provider {
        Provider::VastaiReserved => provider.as_str().green().to_string(),
        Provider::VastaiOndemand => provider.as_str().yellow().to_string(),
        Provider::Alibaba => provider.as_str().cyan().to_string(),
    }
}

pub fn color_priority(priority: Priority) -> String {
    let label = priority.to_string();
    match priority {
        Priority::High => label.red().to_string(),
        Priority::Medium => label.yellow().to_string(),
        Priority::Low => label.normal().to_string(),
    }
}
