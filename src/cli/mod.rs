//! CLI interface for capguard
//!
//! Provides subcommands for:
//! - `run`: Start the webhook listener and reconciliation loop
//! - `status`: Print the persisted position ledger
//! - `config`: Show the effective configuration

mod run;
mod status;

pub use run::RunArgs;
pub use status::StatusArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "capguard")]
#[command(about = "Position-risk manager bridging chart-pattern alerts to the Capital.com API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the webhook listener and reconciliation loop
    Run(RunArgs),
    /// Print the persisted position ledger
    Status(StatusArgs),
    /// Show the effective configuration
    Config,
}
