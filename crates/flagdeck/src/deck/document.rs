//! Arena-backed slide tree.
//!
//! Nodes are never freed: a node removed from the tree stays in the arena,
//! unlinked, and can be inserted again later. This is what lets the
//! reconciler hold on to captured slides across any number of show/hide
//! cycles without re-creating them.

use serde::Serialize;

use crate::error::{Error, Result};

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A heading found in a slide body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    /// Heading level, 1 through 6.
    pub level: u8,
    /// Plain text of the heading.
    pub text: String,
}

/// Content of one slide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Slide {
    /// Section the slide belongs to, from its `data-section` attribute.
    pub section: Option<String>,
    /// Remaining attributes of the `<section>` element, in source order.
    pub attributes: Vec<(String, String)>,
    /// Headings in document order.
    pub headings: Vec<Heading>,
    /// Rendered HTML body.
    pub html: String,
}

impl Slide {
    /// Text of the first heading of level 1 to 3, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.headings
            .iter()
            .find(|h| h.level <= 3)
            .map(|h| h.text.as_str())
    }

    /// Whether a heading of `level` contains `needle`.
    #[must_use]
    pub fn has_heading(&self, level: u8, needle: &str) -> bool {
        self.headings
            .iter()
            .any(|h| h.level == level && h.text.contains(needle))
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Root,
    Slide(Slide),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A tree of slides under a single root container.
///
/// Direct children of the root are horizontal slides; their children are
/// vertical slides.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// The root container.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Allocate a detached slide node.
    pub fn create_slide(&mut self, slide: Slide) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Slide(slide),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Slide content of a node; `None` for the root or an unknown id.
    #[must_use]
    pub fn slide(&self, id: NodeId) -> Option<&Slide> {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Slide(slide)) => Some(slide),
            _ => None,
        }
    }

    /// Parent of a node, `None` when detached or root.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Children of a node, in order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map_or(&[] as &[NodeId], |n| n.children.as_slice())
    }

    /// The sibling following a node.
    #[must_use]
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Whether a node is reachable from the root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current == self.root()
    }

    /// Append `node` as the last child of `parent`, moving it if attached.
    ///
    /// # Errors
    ///
    /// Returns an error if either id is unknown, `node` is the root, or the
    /// move would make a node its own ancestor.
    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        self.check_insert(parent, node)?;
        self.detach(node);
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.push(node);
        Ok(())
    }

    /// Insert `node` right after `reference`, moving it if attached.
    ///
    /// # Errors
    ///
    /// Returns an error if `reference` has no parent or the insertion is
    /// invalid as for [`Document::append_child`].
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<()> {
        if reference == node {
            return Err(Error::tree("cannot insert a node after itself"));
        }
        let parent = self
            .parent(reference)
            .ok_or_else(|| Error::tree(format!("reference node {} is detached", reference.0)))?;
        self.check_insert(parent, node)?;
        self.detach(node);
        let siblings = &mut self.nodes[parent.0].children;
        let pos = siblings
            .iter()
            .position(|&c| c == reference)
            .ok_or_else(|| Error::internal("reference missing from its parent"))?;
        siblings.insert(pos + 1, node);
        self.nodes[node.0].parent = Some(parent);
        Ok(())
    }

    /// Unlink a node from its parent. Returns `false` if it was not linked.
    pub fn detach(&mut self, node: NodeId) -> bool {
        let Some(parent) = self.parent(node) else {
            return false;
        };
        self.nodes[parent.0].children.retain(|&c| c != node);
        self.nodes[node.0].parent = None;
        true
    }

    /// Attached slides in document order (pre-order, root excluded).
    #[must_use]
    pub fn slides(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(self.root()).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Attached slides carrying a section tag, in document order.
    #[must_use]
    pub fn tagged_slides(&self) -> Vec<NodeId> {
        self.slides()
            .into_iter()
            .filter(|&id| self.slide(id).is_some_and(|s| s.section.is_some()))
            .collect()
    }

    /// First top-level slide with a level-`level` heading containing `needle`.
    #[must_use]
    pub fn find_top_level_by_heading(&self, level: u8, needle: &str) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.slide(id).is_some_and(|s| s.has_heading(level, needle)))
    }

    /// Number of horizontal (top-level) slides.
    #[must_use]
    pub fn horizontal_len(&self) -> usize {
        self.children(self.root()).len()
    }

    fn check_insert(&self, parent: NodeId, node: NodeId) -> Result<()> {
        if parent.0 >= self.nodes.len() || node.0 >= self.nodes.len() {
            return Err(Error::tree("unknown node id"));
        }
        if node == self.root() {
            return Err(Error::tree("the root cannot be inserted"));
        }
        let mut current = Some(parent);
        while let Some(id) = current {
            if id == node {
                return Err(Error::tree("a node cannot become its own descendant"));
            }
            current = self.parent(id);
        }
        Ok(())
    }
}
