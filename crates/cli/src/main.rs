//! Hybrid Resource Broker CLI
//!
//! A command-line tool for requesting allocations, listing them, viewing
//! cost advice and reading the local allocation log.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use broker_lib::{ResourceRequest, WorkloadType};
use clap::{Parser, Subcommand};
use commands::{allocations, history, optimize, rates};

/// Hybrid Resource Broker CLI
#[derive(Parser)]
#[command(name = "hbr")]
#[command(author, version, about = "CLI for the Hybrid Resource Broker", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via HBR_API_URL env var)
    #[arg(long, env = "HBR_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request an allocation for a workload
    Allocate {
        /// Workload type (ai_training, ai_inference, media_render, mining,
        /// database, monitoring, development)
        #[arg(long, short)]
        workload: WorkloadType,

        /// GPU memory in GB
        #[arg(long, default_value_t = 0)]
        gpu_memory: u32,

        /// Number of vCPUs
        #[arg(long, default_value_t = 4)]
        vcpus: u32,

        /// RAM in GB
        #[arg(long, default_value_t = 16)]
        ram: u32,

        /// Storage in GB
        #[arg(long, default_value_t = 100)]
        storage: u32,

        /// Expected duration in hours
        #[arg(long)]
        hours: f64,

        /// Budget in USD for the whole duration
        #[arg(long)]
        budget: f64,

        /// Also provision the instance
        #[arg(long)]
        provision: bool,
    },

    /// List current allocations
    List,

    /// Show projected monthly cost and recommendations
    Optimize,

    /// Show hourly rates and workload policies
    Rates,

    /// Show records from a local allocation log
    History {
        /// Allocation log path (defaults to allocations.log)
        #[arg(long)]
        log: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = cli.format;

    match cli.command {
        // History reads a local file and needs no API connection
        Commands::History { log } => history::history(&config.resolve_history_log(log), format),
        Commands::Allocate {
            workload,
            gpu_memory,
            vcpus,
            ram,
            storage,
            hours,
            budget,
            provision,
        } => {
            let client = connect(&config, cli.api_url, cli.verbose)?;
            let request = ResourceRequest {
                workload_type: workload,
                gpu_memory_gb: gpu_memory,
                vcpu_count: vcpus,
                ram_gb: ram,
                storage_gb: storage,
                duration_hours: hours,
                budget_usd: budget,
            };
            allocations::allocate(&client, request, provision, format).await
        }
        Commands::List => {
            let client = connect(&config, cli.api_url, cli.verbose)?;
            allocations::list(&client, format).await
        }
        Commands::Optimize => {
            let client = connect(&config, cli.api_url, cli.verbose)?;
            optimize::optimize(&client, format).await
        }
        Commands::Rates => {
            let client = connect(&config, cli.api_url, cli.verbose)?;
            rates::rates(&client, format).await
        }
    }
}

fn connect(
    config: &config::Config,
    api_url: Option<String>,
    verbose: bool,
) -> Result<client::ApiClient> {
    let api_url = config.resolve_api_url(api_url);
    if verbose {
        output::print_info(&format!("Using broker API at {}", api_url));
    }
    client::ApiClient::new(&api_url)
}
