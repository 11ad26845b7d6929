//! CLI module for lbwire
//!
//! - `lbwire validate` - Check a deployment file and show the desired state
//! - `lbwire simulate` - Converge against a simulated account kept in a JSON file

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

#[derive(Parser, Debug)]
#[command(name = "lbwire")]
#[command(about = "Reconcile the load balancer in front of a container service")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a deployment file
    Validate(ValidateArgs),

    /// Converge a deployment against a simulated cloud account
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the deployment file (JSON, JSONC or YAML)
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to the deployment file (JSON, JSONC or YAML)
    pub file: PathBuf,

    /// JSON file holding the simulated account (missing file = empty account)
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Write the resulting account back to --state
    #[arg(long, requires = "state")]
    pub save: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
