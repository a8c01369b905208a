//! Demo CLI surface: command definitions and terminal output formatting
//! (tables, progress bars) for the `swarmcore` binary. Not part of the
//! library's public API — `application::swarm_service::SwarmService` is.

pub mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "swarmcore")]
#[command(about = "Swarm orchestration core: decompose a task, run it across workers, aggregate the result", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Path to a YAML config file (defaults + env still apply)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a swarm against a task, streaming per-worker progress
    Run {
        /// Task description to decompose and execute
        task: String,

        /// Maximum number of workers to plan for
        #[arg(short, long, default_value = "5")]
        max_workers: u32,

        /// Skip LLM decomposition and run one worker per instruction
        #[arg(short = 'i', long, value_delimiter = ',')]
        instructions: Vec<String>,
    },

    /// Print the current health report (checks + overall status)
    Health,
}
