//! `flagdeck` - a slide deck whose sections follow feature flags
//!
//! The library loads a Markdown deck into a slide tree, keeps a store of
//! boolean flags fed by a remote backend or a polled fallback, and
//! reconciles the tree against the flags: each flag controls one section of
//! slides, inserted after an anchor slide while the flag is on.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod deck;
pub mod engine;
pub mod error;
pub mod flags;
pub mod logging;
pub mod notify;
pub mod reconciler;
pub mod server;
pub mod session;
pub mod store;

pub use config::Config;
pub use deck::{load_deck, parse_deck, Document, NodeId, Slide};
pub use engine::{DeckView, RenderEngine};
pub use error::{Error, Result};
pub use flags::{FlagDef, FlagSet, UserContext};
pub use logging::init_logging;
pub use notify::{NotificationBoard, Notifier};
pub use reconciler::{SectionState, SlideReconciler, SlideRecord};
pub use server::HttpServer;
pub use session::{DeckSnapshot, Presentation};
pub use store::{BackendMode, FlagChange, FlagStore, Ready};
