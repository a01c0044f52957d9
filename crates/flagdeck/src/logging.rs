//! Logging setup for flagdeck.
//!
//! Everything logs through `tracing`. This module installs the subscriber:
//! an [`EnvFilter`] built from the CLI verbosity (or `RUST_LOG`) in front of
//! a plain `fmt` layer. The HTTP stack underneath the flag backend is chatty
//! at debug level, so the default filter keeps it at `warn` unless the
//! presenter asks for `-vv`.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose logs are capped at `warn` below trace verbosity.
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper_util", "reqwest", "tiny_http"];

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level), including the HTTP stack.
    Trace,
}

impl Verbosity {
    /// Convert verbosity to a tracing level.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// The filter used when `RUST_LOG` is not set.
    ///
    /// flagdeck itself logs at the chosen level. The HTTP client and server
    /// crates stay at `warn` unless verbosity is [`Verbosity::Trace`], where
    /// everything is let through.
    #[must_use]
    pub fn default_directive(&self) -> String {
        let level = self.to_level_filter();
        if *self == Self::Trace {
            return level.to_string();
        }
        let mut directive = format!("flagdeck={level}");
        for name in QUIET_DEPENDENCIES {
            directive.push_str(&format!(",{name}=warn"));
        }
        directive
    }
}

/// Initialize the logging system.
///
/// This should be called once at startup, before the configuration is
/// loaded, so that configuration problems are logged too. The level can be
/// controlled via:
/// 1. The `verbosity` parameter (`-q`, `-v`, `-vv` on the command line)
/// 2. The `RUST_LOG` environment variable (takes precedence)
///
/// # Examples
///
/// ```no_run
/// use flagdeck::{init_logging, logging::Verbosity};
///
/// // Show flag changes and section transitions as they happen
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let default_filter = verbosity.default_directive();

    // RUST_LOG wins over the CLI flags
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // A subscriber may already be installed (tests, embedding).
    let _ = subscriber.try_init();
}

/// Initialize logging for tests.
///
/// Only warnings and errors are shown, which is where the reconciler and the
/// flag store report degraded paths (missing anchor, failed polls).
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
