//! CLI module for Quire
//!
//! Provides command-line interface parsing for the quire-server binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quire - multi-agent research and content orchestration server
#[derive(Parser, Debug)]
#[command(
    name = "quire-server",
    version,
    about = "Quire - multi-agent research and content orchestration server",
    long_about = "Runs parallel research workers over a durable coordination store and streams\n\
                  generated content with iterative, versioned revision.\n\n\
                  Run without arguments to start the server.",
    after_help = "EXAMPLES:\n    \
                  quire-server                    # Start the server (reads quire.toml)\n    \
                  quire-server --config my.toml   # Use a custom config file\n    \
                  quire-server check              # Validate the configuration and exit"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "quire.toml", global = true)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Watch the configuration file and reload it on change
        #[arg(long)]
        watch: bool,
    },

    /// Validate the configuration file and exit
    Check,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run, `serve` when none was given
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Serve { watch: false })
    }
}
