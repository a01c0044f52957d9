//! The slide deck: tree model, Markdown loading and HTML rendering.

mod document;
mod markdown;
mod render;

pub use document::{Document, Heading, NodeId, Slide};
pub use markdown::{load_deck, parse_deck};
pub use render::{escape_attr, render_slides};
