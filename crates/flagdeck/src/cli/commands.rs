//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Markdown deck to present (overrides configuration)
    #[arg(short, long, value_name = "FILE")]
    pub deck: Option<PathBuf>,
}

/// Deck inspection commands.
#[derive(Debug, Subcommand)]
pub enum DeckCommand {
    /// List flag sections and their slides
    Sections {
        /// Deck file (defaults to the configured deck)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Flags command arguments.
#[derive(Debug, Args)]
pub struct FlagsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
