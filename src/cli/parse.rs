//! CLI parse: clap types for shotqueue. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shotqueue - combinatorial prompt expansion and resumable generation queues
#[derive(Parser)]
#[command(name = "shotqueue")]
#[command(about = "Expand prompt variations and render shots through a resumable queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (holds config/config.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub verbose: bool,

    /// Disable logging
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a prompt template and preview its expansions
    Expand {
        prompt: String,
        /// Print every expansion instead of the preview
        #[arg(long)]
        all: bool,
    },
    /// Import shots (and reference tags) from a JSON file into a project
    Import {
        file: PathBuf,
        #[arg(long)]
        project: String,
    },
    /// List a project's shots in sequence order
    Shots {
        #[arg(long)]
        project: String,
    },
    /// Count the outputs a generation run would produce
    Estimate {
        #[arg(long)]
        project: String,
        /// Restrict to these shot ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        shots: Vec<String>,
    },
    /// Create a queue and render it; Ctrl-C cancels
    Generate {
        #[arg(long)]
        project: String,
        /// Restrict to these shot ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        shots: Vec<String>,
    },
    /// Resume an interrupted queue from its checkpoint
    Resume {
        #[arg(long)]
        queue: String,
        /// Resume without asking
        #[arg(long)]
        yes: bool,
        /// Discard the checkpoint instead
        #[arg(long, conflicts_with = "yes")]
        discard: bool,
    },
    /// Retry one shot, or every failed shot of the project
    Retry {
        #[arg(long)]
        project: String,
        #[arg(long)]
        shot: Option<String>,
    },
    /// Show one queue, or list all queues
    Status {
        #[arg(long)]
        queue: Option<String>,
    },
    /// Inspect or clear the recovery checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Print progress events recorded for a queue
    Events {
        #[arg(long)]
        queue: String,
        /// Only events after this sequence number
        #[arg(long, default_value_t = 0)]
        after: u64,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// Show the current checkpoint, including stale ones
    Show,
    /// Delete the checkpoint
    Clear,
}
