//! Rendering engine contract and the server-side deck view.
//!
//! The reconciler only ever talks to a [`RenderEngine`]: after mutating the
//! tree it asks for a resync, and a full reset asks to go back to the first
//! slide. [`DeckView`] is the implementation browsers follow: it keeps the
//! horizontal index, a revision counter and a fingerprint of the visible
//! slide sequence.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::deck::{Document, NodeId};

/// The operations the reconciler needs from a presentation engine.
pub trait RenderEngine: Send {
    /// Re-read the tree after slides were inserted or removed.
    fn resync_index(&mut self, doc: &Document);

    /// Navigate to the horizontal slide at `index`.
    fn go_to_slide(&mut self, index: usize);

    /// The current horizontal slide index.
    fn current_index(&self) -> usize;
}

/// Payload of the slide-changed hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlideChanged {
    /// Horizontal index before the change.
    pub previous: usize,
    /// Horizontal index after the change.
    pub indexh: usize,
}

type SlideChangedHook = Box<dyn FnMut(SlideChanged) + Send>;

/// Engine state served to browsers.
pub struct DeckView {
    index: usize,
    len: usize,
    revision: u64,
    fingerprint: String,
    hooks: Vec<SlideChangedHook>,
}

impl fmt::Debug for DeckView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeckView")
            .field("index", &self.index)
            .field("len", &self.len)
            .field("revision", &self.revision)
            .field("fingerprint", &self.fingerprint)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Default for DeckView {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckView {
    /// Create a view positioned on the first slide of an empty deck.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: 0,
            len: 0,
            revision: 0,
            fingerprint: fingerprint_of(&Document::new()),
            hooks: Vec::new(),
        }
    }

    /// Register a hook called whenever the horizontal index moves.
    pub fn on_slide_changed(&mut self, hook: impl FnMut(SlideChanged) + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Number of horizontal slides at the last resync.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the deck was empty at the last resync.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of resyncs performed so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Hash of the visible slide structure at the last resync.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn move_to(&mut self, index: usize) {
        let clamped = index.min(self.len.saturating_sub(1));
        if clamped == self.index {
            return;
        }
        let event = SlideChanged {
            previous: self.index,
            indexh: clamped,
        };
        self.index = clamped;
        info!(index = clamped, "Slide changed");
        for hook in &mut self.hooks {
            hook(event);
        }
    }
}

impl RenderEngine for DeckView {
    fn resync_index(&mut self, doc: &Document) {
        self.len = doc.horizontal_len();
        self.revision += 1;
        self.fingerprint = fingerprint_of(doc);
        debug!(
            slides = self.len,
            revision = self.revision,
            "Resynced deck index"
        );
        self.move_to(self.index);
    }

    fn go_to_slide(&mut self, index: usize) {
        self.move_to(index);
    }

    fn current_index(&self) -> usize {
        self.index
    }
}

/// blake3 hash over the attached slides and their nesting depth.
#[must_use]
pub fn fingerprint_of(doc: &Document) -> String {
    let mut hasher = blake3::Hasher::new();
    let mut stack: Vec<(NodeId, u8)> = doc
        .children(doc.root())
        .iter()
        .rev()
        .map(|&id| (id, 0))
        .collect();
    while let Some((id, depth)) = stack.pop() {
        hasher.update(&[depth]);
        hasher.update(&(id.index() as u64).to_le_bytes());
        stack.extend(doc.children(id).iter().rev().map(|&c| (c, depth.saturating_add(1))));
    }
    hasher.finalize().to_hex().to_string()
}
