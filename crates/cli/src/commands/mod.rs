//! Subcommand implementations

pub mod allocations;
pub mod history;
pub mod optimize;
pub mod rates;
