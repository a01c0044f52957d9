//! Command-line interface for flagdeck.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, DeckCommand, FlagsCommand, ServeCommand};

/// flagdeck - A slide deck whose sections follow feature flags
///
/// Serves a Markdown deck over HTTP and shows or hides flag-controlled
/// sections as their flags change.
#[derive(Debug, Parser)]
#[command(name = "flagdeck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the presentation
    Serve(ServeCommand),

    /// Inspect the deck
    #[command(subcommand)]
    Deck(DeckCommand),

    /// Show the declared flags
    Flags(FlagsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "flagdeck");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["flagdeck", "-q", "flags"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["flagdeck", "flags"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["flagdeck", "-v", "flags"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["flagdeck", "-vv", "flags"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = parse(&["flagdeck", "serve", "--port", "8080", "--deck", "talk.md"]);
        let Command::Serve(serve) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(serve.port, Some(8080));
        assert_eq!(serve.deck, Some(PathBuf::from("talk.md")));
    }

    #[test]
    fn test_parse_deck_sections() {
        let cli = parse(&["flagdeck", "deck", "sections", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Deck(DeckCommand::Sections { json: true, file: None })
        ));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["flagdeck", "-c", "/custom/config.toml", "config", "validate"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: None })
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["flagdeck", "daemon"]).is_err());
    }
}
