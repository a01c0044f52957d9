//! Keeps the live slide tree in lockstep with flag state.
//!
//! [`SlideReconciler::capture_all`] lifts every tagged slide out of the tree
//! once, at startup. From then on each section is either `Hidden` (its
//! nodes are unlinked, held only by their [`SlideRecord`]s) or `Shown` (its
//! nodes sit, in captured order, right after the anchor slide). Both
//! transitions are idempotent.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::deck::{Document, NodeId};
use crate::engine::RenderEngine;
use crate::error::Error;
use crate::flags::FlagSet;
use crate::notify::Notifier;
use crate::store::{FlagChange, FlagStore};

/// Heading level the anchor slide is found by.
const ANCHOR_LEVEL: u8 = 2;

/// Presence of a section in the live tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionState {
    /// Nodes are held by the reconciler, not attached.
    Hidden,
    /// Nodes are attached after the anchor.
    Shown,
}

/// One captured slide node and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlideRecord {
    /// The captured node.
    pub node: NodeId,
    /// Index within the section's ordered list.
    pub position: usize,
    /// Parent at capture time.
    pub parent: Option<NodeId>,
    /// Next sibling at capture time.
    pub next_sibling: Option<NodeId>,
}

#[derive(Debug)]
struct Section {
    name: String,
    records: Vec<SlideRecord>,
    state: SectionState,
}

/// Summary of one section for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
    /// Section name.
    pub name: String,
    /// Flag controlling the section, if any.
    pub flag: Option<String>,
    /// Current state.
    pub state: SectionState,
    /// Number of captured slides.
    pub slides: usize,
}

/// One attached slide in the outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    /// Position in document order.
    pub index: usize,
    /// Section tag, or `main` for untagged slides.
    pub section: String,
    /// First heading, or `No title`.
    pub title: String,
}

/// Shows and hides tagged slides in a [`Document`].
pub struct SlideReconciler<E, N> {
    doc: Document,
    engine: E,
    notifier: N,
    flags: FlagSet,
    anchor_heading: String,
    sections: Vec<Section>,
    captured: bool,
}

impl<E, N> std::fmt::Debug for SlideReconciler<E, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlideReconciler")
            .field("anchor_heading", &self.anchor_heading)
            .field("sections", &self.sections)
            .field("captured", &self.captured)
            .finish_non_exhaustive()
    }
}

impl<E: RenderEngine, N: Notifier> SlideReconciler<E, N> {
    /// Create a reconciler over `doc`. Nothing is captured yet.
    pub fn new(
        doc: Document,
        engine: E,
        notifier: N,
        flags: FlagSet,
        anchor_heading: impl Into<String>,
    ) -> Self {
        let sections = flags
            .keys()
            .map(|key| Section {
                name: flags.section_of(key).to_string(),
                records: Vec::new(),
                state: SectionState::Hidden,
            })
            .collect();
        Self {
            doc,
            engine,
            notifier,
            flags,
            anchor_heading: anchor_heading.into(),
            sections,
            captured: false,
        }
    }

    /// The live tree.
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The rendering engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The rendering engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The notification sink, mutably.
    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// The known flags.
    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    /// Current state of a section, `None` if unknown.
    pub fn state(&self, section: &str) -> Option<SectionState> {
        self.section(section).map(|s| s.state)
    }

    /// Captured records of a section, in order.
    pub fn records(&self, section: &str) -> &[SlideRecord] {
        self.section(section)
            .map_or(&[] as &[SlideRecord], |s| s.records.as_slice())
    }

    /// Lift every tagged slide out of the tree, grouped by section.
    ///
    /// Only the outermost tagged slide of a vertical stack is captured, so
    /// the stack moves as one. Runs once; later calls are ignored. Returns
    /// the number of captured slides.
    pub fn capture_all(&mut self) -> usize {
        if self.captured {
            warn!("Slides already captured, ignoring");
            return 0;
        }
        self.captured = true;

        let tagged: Vec<NodeId> = self
            .doc
            .tagged_slides()
            .into_iter()
            .filter(|&id| !self.has_tagged_ancestor(id))
            .collect();

        for &node in &tagged {
            let Some(name) = self.doc.slide(node).and_then(|s| s.section.clone()) else {
                continue;
            };
            let record = SlideRecord {
                node,
                position: 0,
                parent: self.doc.parent(node),
                next_sibling: self.doc.next_sibling(node),
            };
            self.doc.detach(node);

            let idx = match self.position(&name) {
                Some(idx) => idx,
                None => {
                    warn!(section = %name, "No flag controls this section, it stays hidden");
                    self.sections.push(Section {
                        name: name.clone(),
                        records: Vec::new(),
                        state: SectionState::Hidden,
                    });
                    self.sections.len() - 1
                }
            };
            let section = &mut self.sections[idx];
            section.records.push(SlideRecord {
                position: section.records.len(),
                ..record
            });
        }

        info!(
            slides = tagged.len(),
            sections = self.sections.iter().filter(|s| !s.records.is_empty()).count(),
            "Captured flag sections"
        );
        self.engine.resync_index(&self.doc);
        tagged.len()
    }

    /// Attach a section's slides after the anchor.
    pub fn show(&mut self, section: &str) {
        let Some(idx) = self.position(section) else {
            warn!(section, "Cannot show unknown section");
            return;
        };
        let nodes: Vec<NodeId> = self.sections[idx].records.iter().map(|r| r.node).collect();

        if self.sections[idx].state == SectionState::Shown {
            let root = self.doc.root();
            let mut restored = 0;
            for &node in &nodes {
                if self.doc.is_attached(node) {
                    continue;
                }
                match self.doc.append_child(root, node) {
                    Ok(()) => restored += 1,
                    Err(e) => warn!(error = %e, section, "Failed to restore slide"),
                }
            }
            if restored > 0 {
                warn!(section, restored, "Restored detached slides of a shown section");
                self.engine.resync_index(&self.doc);
            }
            return;
        }

        match self
            .doc
            .find_top_level_by_heading(ANCHOR_LEVEL, &self.anchor_heading)
        {
            Some(anchor) => {
                let mut previous = anchor;
                for &node in &nodes {
                    match self.doc.insert_after(previous, node) {
                        Ok(()) => previous = node,
                        Err(e) => warn!(error = %e, section, "Failed to insert slide"),
                    }
                }
            }
            None => {
                let err = Error::AnchorNotFound {
                    heading: self.anchor_heading.clone(),
                };
                warn!(error = %err, section, "Appending section at the end");
                let root = self.doc.root();
                for record in &self.sections[idx].records {
                    let parent = record
                        .parent
                        .filter(|&p| p == root || self.doc.is_attached(p))
                        .unwrap_or(root);
                    if let Err(e) = self.doc.append_child(parent, record.node) {
                        warn!(error = %e, section, "Failed to append slide");
                    }
                }
            }
        }

        self.sections[idx].state = SectionState::Shown;
        debug!(section, slides = nodes.len(), "Section shown");
        self.engine.resync_index(&self.doc);
    }

    /// Detach a section's slides.
    pub fn hide(&mut self, section: &str) {
        let Some(idx) = self.position(section) else {
            warn!(section, "Cannot hide unknown section");
            return;
        };
        let entry = &mut self.sections[idx];

        if entry.state == SectionState::Hidden {
            for record in &entry.records {
                if self.doc.detach(record.node) {
                    warn!(section, "Detached a stray slide of a hidden section");
                }
            }
            return;
        }

        for record in &entry.records {
            self.doc.detach(record.node);
        }
        entry.state = SectionState::Hidden;
        debug!(section, slides = entry.records.len(), "Section hidden");
        self.engine.resync_index(&self.doc);
    }

    /// React to one committed flag change.
    pub fn on_flag_changed(&mut self, key: &str, value: bool) {
        let section = self.flags.section_of(key).to_string();
        if value {
            self.show(&section);
        } else {
            self.hide(&section);
        }
        let status = if value { "enabled" } else { "disabled" };
        let message = format!("{} section {status}", self.flags.display_name(key));
        self.notifier.notify(message, value);
    }

    /// Reconcile every section to the store without notifying.
    pub fn sync_all(&mut self, store: &FlagStore) {
        let targets: Vec<(String, bool)> = self
            .flags
            .keys()
            .map(|key| (self.flags.section_of(key).to_string(), store.get_value(key)))
            .collect();
        for (section, shown) in targets {
            if shown {
                self.show(&section);
            } else {
                self.hide(&section);
            }
        }
    }

    /// Hide everything, clear every flag and go back to the first slide.
    ///
    /// Returns the flag changes the reset committed. The sections are
    /// already hidden when the store's subscribers see them.
    pub fn reset_all(&mut self, store: &mut FlagStore) -> Vec<FlagChange> {
        let names: Vec<String> = self.sections.iter().map(|s| s.name.clone()).collect();
        for name in &names {
            self.hide(name);
        }
        let changes = store.reset();
        self.engine.go_to_slide(0);
        info!("Presentation reset");
        changes
    }

    /// Detach every tagged slide without touching flags.
    ///
    /// Returns the number of slides removed.
    ///
    /// Captured nodes are detached whole, vertical children included. A
    /// tagged slide no record owns is detached only if it has no tagged
    /// ancestor.
    pub fn remove_all_tagged(&mut self) -> usize {
        let mut removed = 0;
        let owned: Vec<NodeId> = self
            .sections
            .iter()
            .flat_map(|s| s.records.iter().map(|r| r.node))
            .collect();
        for node in owned {
            if self.doc.detach(node) {
                removed += 1;
            }
        }
        // Children of captured nodes are no longer reachable from the root.
        let strays: Vec<NodeId> = self
            .doc
            .tagged_slides()
            .into_iter()
            .filter(|&id| !self.has_tagged_ancestor(id))
            .collect();
        for id in strays {
            if self.doc.detach(id) {
                warn!(node = id.index(), "Detached a tagged slide no section owns");
                removed += 1;
            }
        }
        for section in &mut self.sections {
            section.state = SectionState::Hidden;
        }
        self.engine.resync_index(&self.doc);
        info!(removed, "Removed all flag sections");
        removed
    }

    /// Every section with its state and slide count.
    pub fn sections(&self) -> Vec<SectionInfo> {
        self.sections
            .iter()
            .map(|s| SectionInfo {
                name: s.name.clone(),
                flag: self.flags.for_section(&s.name).map(|def| def.key.clone()),
                state: s.state,
                slides: s.records.len(),
            })
            .collect()
    }

    /// Every attached slide in document order.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        self.doc
            .slides()
            .into_iter()
            .enumerate()
            .filter_map(|(index, id)| {
                let slide = self.doc.slide(id)?;
                Some(OutlineEntry {
                    index,
                    section: slide.section.clone().unwrap_or_else(|| "main".to_string()),
                    title: slide.title().unwrap_or("No title").to_string(),
                })
            })
            .collect()
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    fn has_tagged_ancestor(&self, id: NodeId) -> bool {
        let mut current = self.doc.parent(id);
        while let Some(parent) = current {
            if self.doc.slide(parent).is_some_and(|s| s.section.is_some()) {
                return true;
            }
            current = self.doc.parent(parent);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::deck::parse_deck;
    use crate::engine::DeckView;
    use crate::flags::{default_flags, DEFAULT_SECTION_SUFFIX};
    use crate::notify::NotificationBoard;

    const DECK: &str = r#"# Welcome

---

## Core Value Propositions

- Ship safely

---

<!-- .slide: data-section="guarded-releases" -->
## Guarded Releases 1

---

<!-- .slide: data-section="guarded-releases" -->
## Guarded Releases 2

---

<!-- .slide: data-section="guarded-releases" -->
## Guarded Releases 3

---

<!-- .slide: data-section="experimentation" -->
## Experimentation

--

### Experiment details

---

<!-- .slide: data-section="ai-configs" -->
## AI Configs

---

## Thank You
"#;

    #[derive(Debug, Default)]
    struct RecordingEngine {
        resyncs: usize,
        index: usize,
        gone_to: Vec<usize>,
    }

    impl RenderEngine for RecordingEngine {
        fn resync_index(&mut self, _doc: &Document) {
            self.resyncs += 1;
        }

        fn go_to_slide(&mut self, index: usize) {
            self.index = index;
            self.gone_to.push(index);
        }

        fn current_index(&self) -> usize {
            self.index
        }
    }

    #[derive(Debug, Default)]
    struct RecordingNotifier(Vec<(String, bool)>);

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, message: String, enabled: bool) {
            self.0.push((message, enabled));
        }
    }

    fn flag_set() -> FlagSet {
        FlagSet::new(default_flags(), DEFAULT_SECTION_SUFFIX)
    }

    fn reconciler() -> SlideReconciler<RecordingEngine, RecordingNotifier> {
        let doc = parse_deck(DECK).unwrap();
        let mut reconciler = SlideReconciler::new(
            doc,
            RecordingEngine::default(),
            RecordingNotifier::default(),
            flag_set(),
            "Core Value Propositions",
        );
        reconciler.capture_all();
        reconciler
    }

    fn titles(r: &SlideReconciler<RecordingEngine, RecordingNotifier>) -> Vec<String> {
        let doc = r.document();
        doc.children(doc.root())
            .iter()
            .filter_map(|&id| doc.slide(id)?.title().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_capture_detaches_tagged_slides() {
        let r = reconciler();
        assert_eq!(
            titles(&r),
            vec!["Welcome", "Core Value Propositions", "Thank You"]
        );
        assert_eq!(r.records("guarded-releases").len(), 3);
        assert_eq!(r.records("experimentation").len(), 1);
        assert!(r.records("observability").is_empty());
        assert_eq!(r.state("ai-configs"), Some(SectionState::Hidden));
        assert_eq!(r.engine().resyncs, 1);
    }

    #[test]
    fn test_capture_records_positions_and_origin() {
        let r = reconciler();
        let records = r.records("guarded-releases");
        let root = r.document().root();
        assert_eq!(
            records.iter().map(|rec| rec.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(records.iter().all(|rec| rec.parent == Some(root)));
        assert_eq!(records[0].next_sibling, Some(records[1].node));
    }

    #[test]
    fn test_capture_twice_is_noop() {
        let mut r = reconciler();
        assert_eq!(r.capture_all(), 0);
        assert_eq!(r.records("guarded-releases").len(), 3);
    }

    #[test]
    fn test_show_inserts_after_anchor_in_order() {
        let mut r = reconciler();
        r.show("guarded-releases");
        assert_eq!(
            titles(&r),
            vec![
                "Welcome",
                "Core Value Propositions",
                "Guarded Releases 1",
                "Guarded Releases 2",
                "Guarded Releases 3",
                "Thank You"
            ]
        );
        assert_eq!(r.state("guarded-releases"), Some(SectionState::Shown));
    }

    #[test]
    fn test_show_twice_is_idempotent() {
        let mut r = reconciler();
        r.show("guarded-releases");
        let once = titles(&r);
        let resyncs = r.engine().resyncs;

        r.show("guarded-releases");
        assert_eq!(titles(&r), once);
        assert_eq!(r.engine().resyncs, resyncs);
    }

    #[test]
    fn test_hide_hidden_is_noop() {
        let mut r = reconciler();
        let before = titles(&r);
        let resyncs = r.engine().resyncs;
        r.hide("guarded-releases");
        r.hide("guarded-releases");
        assert_eq!(titles(&r), before);
        assert_eq!(r.engine().resyncs, resyncs);
    }

    #[test]
    fn test_hide_then_show_preserves_order() {
        let mut r = reconciler();
        r.show("guarded-releases");
        r.hide("guarded-releases");
        r.show("guarded-releases");
        let t = titles(&r);
        let anchor = t.iter().position(|s| s == "Core Value Propositions").unwrap();
        assert_eq!(
            &t[anchor + 1..anchor + 4],
            ["Guarded Releases 1", "Guarded Releases 2", "Guarded Releases 3"]
        );
    }

    #[test]
    fn test_round_trip_keeps_node_identity() {
        let mut r = reconciler();
        let captured: Vec<NodeId> = r.records("guarded-releases").iter().map(|x| x.node).collect();

        r.hide("guarded-releases");
        r.show("guarded-releases");
        r.hide("guarded-releases");

        let held: Vec<NodeId> = r.records("guarded-releases").iter().map(|x| x.node).collect();
        assert_eq!(held, captured);
        assert!(held.iter().all(|&id| !r.document().is_attached(id)));
        // Nothing leaked into the tree or got duplicated.
        assert_eq!(r.document().horizontal_len(), 3);
    }

    #[test]
    fn test_vertical_stack_moves_as_one() {
        let mut r = reconciler();
        r.show("experimentation");
        let doc = r.document();
        let node = r.records("experimentation")[0].node;
        assert!(doc.is_attached(node));
        assert_eq!(doc.children(node).len(), 1);
    }

    #[test]
    fn test_sections_anchor_independently() {
        let mut r = reconciler();
        r.show("guarded-releases");
        r.show("ai-configs");
        let t = titles(&r);
        // The later batch lands right after the anchor.
        assert_eq!(t[2], "AI Configs");
        assert_eq!(t[3], "Guarded Releases 1");

        r.hide("guarded-releases");
        assert_eq!(
            titles(&r),
            vec!["Welcome", "Core Value Propositions", "AI Configs", "Thank You"]
        );
    }

    #[test]
    fn test_missing_anchor_appends_at_end() {
        crate::logging::init_test_logging();
        let doc = parse_deck(
            "# Intro\n\n---\n\n<!-- .slide: data-section=\"observability\" -->\n## Obs\n\n---\n\n# Outro\n",
        )
        .unwrap();
        let mut r = SlideReconciler::new(
            doc,
            RecordingEngine::default(),
            RecordingNotifier::default(),
            flag_set(),
            "Core Value Propositions",
        );
        r.capture_all();
        r.show("observability");
        assert_eq!(titles(&r), vec!["Intro", "Outro", "Obs"]);
        assert_eq!(r.state("observability"), Some(SectionState::Shown));
    }

    #[test]
    fn test_show_after_cleanup_reattaches() {
        let mut r = reconciler();
        r.show("ai-configs");
        let node = r.records("ai-configs")[0].node;
        r.remove_all_tagged();
        assert_eq!(r.state("ai-configs"), Some(SectionState::Hidden));

        r.show("ai-configs");
        assert!(r.document().is_attached(node));
    }

    #[test]
    fn test_show_restores_stray_detached_node() {
        let mut r = reconciler();
        r.show("guarded-releases");
        let node = r.records("guarded-releases")[1].node;
        r.doc.detach(node);
        let resyncs = r.engine().resyncs;

        r.show("guarded-releases");
        let root = r.document().root();
        assert_eq!(r.document().children(root).last(), Some(&node));
        assert_eq!(r.engine().resyncs, resyncs + 1);
        assert_eq!(r.state("guarded-releases"), Some(SectionState::Shown));
    }

    #[test]
    fn test_cleanup_keeps_tagged_vertical_children() {
        let doc = parse_deck(
            "## Core Value Propositions\n\n---\n\n\
<!-- .slide: data-section=\"guarded-releases\" -->\n## Outer\n\n--\n\n\
<!-- .slide: data-section=\"guarded-releases\" -->\n### Inner\n\n---\n\n# End\n",
        )
        .unwrap();
        let mut r = SlideReconciler::new(
            doc,
            RecordingEngine::default(),
            RecordingNotifier::default(),
            flag_set(),
            "Core Value Propositions",
        );
        assert_eq!(r.capture_all(), 1);
        let outer = r.records("guarded-releases")[0].node;

        r.show("guarded-releases");
        assert_eq!(r.document().children(outer).len(), 1);

        assert_eq!(r.remove_all_tagged(), 1);
        r.show("guarded-releases");
        assert!(r.document().is_attached(outer));
        assert_eq!(r.document().children(outer).len(), 1);
    }

    #[test]
    fn test_unknown_section_is_ignored() {
        let mut r = reconciler();
        let before = titles(&r);
        r.show("nonexistent");
        r.hide("nonexistent");
        assert_eq!(titles(&r), before);
        assert_eq!(r.state("nonexistent"), None);
    }

    #[test]
    fn test_flag_change_notifies() {
        let mut r = reconciler();
        r.on_flag_changed("ai-configs-section", true);
        assert!(titles(&r).contains(&"AI Configs".to_string()));
        r.on_flag_changed("ai-configs-section", false);
        assert!(!titles(&r).contains(&"AI Configs".to_string()));

        assert_eq!(
            r.notifier_mut().0,
            vec![
                ("AI Configs section enabled".to_string(), true),
                ("AI Configs section disabled".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_toggle_scenario_with_notification_board() {
        let doc = parse_deck(DECK).unwrap();
        let mut r = SlideReconciler::new(
            doc,
            DeckView::new(),
            NotificationBoard::new(Duration::from_secs(3)),
            flag_set(),
            "Core Value Propositions",
        );
        r.capture_all();
        let mut store = FlagStore::new(flag_set());

        let start = Instant::now();
        let value = store.toggle("ai-configs-section").unwrap();
        r.on_flag_changed("ai-configs-section", value);

        let doc = r.document();
        let anchor = doc
            .find_top_level_by_heading(2, "Core Value Propositions")
            .unwrap();
        let x = r.records("ai-configs")[0].node;
        assert_eq!(doc.next_sibling(anchor), Some(x));

        let live = r.notifier_mut().active_at(start + Duration::from_millis(100));
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].message, "AI Configs section enabled");
        assert!(r
            .notifier_mut()
            .active_at(start + Duration::from_secs(4))
            .is_empty());

        let value = store.toggle("ai-configs-section").unwrap();
        r.on_flag_changed("ai-configs-section", value);
        assert!(!r.document().is_attached(x));
        let live = r.notifier_mut().active();
        assert_eq!(live[0].message, "AI Configs section disabled");
    }

    #[test]
    fn test_sync_all_follows_store_silently() {
        let mut r = reconciler();
        let mut store = FlagStore::new(flag_set());
        store.toggle("experimentation-section");
        r.sync_all(&store);

        assert_eq!(r.state("experimentation"), Some(SectionState::Shown));
        assert_eq!(r.state("guarded-releases"), Some(SectionState::Hidden));
        assert!(r.notifier_mut().0.is_empty());
    }

    #[test]
    fn test_reset_all_after_showing_two_sections() {
        let mut r = reconciler();
        let mut store = FlagStore::new(flag_set());
        for key in ["guarded-releases-section", "ai-configs-section"] {
            let value = store.toggle(key).unwrap();
            r.on_flag_changed(key, value);
        }
        r.engine_mut().go_to_slide(3);

        let changes = r.reset_all(&mut store);
        assert_eq!(changes.len(), 2);

        assert!(r.document().tagged_slides().is_empty());
        assert!(store.snapshot().values().all(|&v| !v));
        assert_eq!(r.engine().current_index(), 0);
        assert!(r
            .sections()
            .iter()
            .all(|s| s.state == SectionState::Hidden));
    }

    #[test]
    fn test_remove_all_tagged_leaves_flags() {
        let mut r = reconciler();
        let mut store = FlagStore::new(flag_set());
        store.toggle("ai-configs-section");
        r.sync_all(&store);

        assert_eq!(r.remove_all_tagged(), 1);
        assert!(r.document().tagged_slides().is_empty());
        assert!(store.get_value("ai-configs-section"));
    }

    #[test]
    fn test_sections_listing() {
        let r = reconciler();
        let sections = r.sections();
        assert_eq!(sections.len(), 4);
        let guarded = &sections[0];
        assert_eq!(guarded.name, "guarded-releases");
        assert_eq!(guarded.flag.as_deref(), Some("guarded-releases-section"));
        assert_eq!(guarded.slides, 3);
    }

    #[test]
    fn test_untracked_section_is_captured_and_listed() {
        let doc = parse_deck("## Core Value Propositions\n\n---\n\n<!-- .slide: data-section=\"bonus\" -->\n# Bonus\n").unwrap();
        let mut r = SlideReconciler::new(
            doc,
            RecordingEngine::default(),
            RecordingNotifier::default(),
            flag_set(),
            "Core Value Propositions",
        );
        assert_eq!(r.capture_all(), 1);
        let bonus = r.sections().into_iter().find(|s| s.name == "bonus").unwrap();
        assert!(bonus.flag.is_none());
        assert_eq!(bonus.state, SectionState::Hidden);
    }

    #[test]
    fn test_outline() {
        let mut r = reconciler();
        r.show("experimentation");
        let outline = r.outline();
        assert_eq!(outline[0].section, "main");
        assert_eq!(outline[0].title, "Welcome");
        let exp: Vec<_> = outline
            .iter()
            .filter(|e| e.section == "experimentation")
            .collect();
        assert_eq!(exp.len(), 1);
        // The vertical child is untagged.
        assert!(outline.iter().any(|e| e.title == "Experiment details" && e.section == "main"));
        assert_eq!(
            outline.iter().map(|e| e.index).collect::<Vec<_>>(),
            (0..outline.len()).collect::<Vec<_>>()
        );
    }
}
