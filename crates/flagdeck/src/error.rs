//! Error types for flagdeck.
//!
//! Every error here is local-recoverable: the session logs it and keeps the
//! presentation running. Only startup (configuration, deck loading, binding
//! the HTTP port) can surface one to the caller of `main`.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for flagdeck operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Flag Backend Errors ===
    /// The remote flag client could not be constructed or initialized.
    #[error("flag backend initialization failed: {message}")]
    BackendInit {
        /// Description of what went wrong.
        message: String,
    },

    /// Fetching flag values from the fallback source failed.
    #[error("flag fetch from {source_name} failed: {message}")]
    BackendFetch {
        /// Name of the source that was polled.
        source_name: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Deck Errors ===
    /// The anchor slide could not be found in the live tree.
    #[error("anchor slide containing \"{heading}\" not found")]
    AnchorNotFound {
        /// Heading text the anchor was searched by.
        heading: String,
    },

    /// The deck file could not be parsed.
    #[error("failed to parse deck {path}: {message}")]
    DeckParse {
        /// Path of the deck file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// A document tree operation was given nodes it cannot work with.
    #[error("document tree error: {0}")]
    Tree(String),

    // === Server Errors ===
    /// The HTTP server could not be started.
    #[error("failed to start server on {addr}: {message}")]
    Server {
        /// Address the server tried to bind.
        addr: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Network Errors ===
    /// HTTP client request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for flagdeck operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a backend initialization error.
    #[must_use]
    pub fn backend_init(message: impl Into<String>) -> Self {
        Self::BackendInit {
            message: message.into(),
        }
    }

    /// Create a backend fetch error for the named source.
    #[must_use]
    pub fn backend_fetch(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendFetch {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a document tree error.
    #[must_use]
    pub fn tree(message: impl Into<String>) -> Self {
        Self::Tree(message.into())
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error means the flag backend should be replaced by polling.
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::BackendInit { .. } | Self::Timeout { .. } | Self::Http(_)
        )
    }
}
