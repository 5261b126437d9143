//! Boolean filter tree over line selections.
//!
//! Nodes live in an arena and are addressed by [`FilterId`]. A freed slot is
//! reused with a bumped generation, so an id kept after `remove` never
//! resolves to the node that later takes its slot.

use std::fmt::{self, Write as _};

use tracing::debug;

use super::leaf::{Leaf, LeafKind};
use super::FilterError;
use crate::index::bitset::BitSet;
use crate::reader::line::NO_COLOR;
use crate::reader::LineSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId {
    slot: u32,
    generation: u32,
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    And,
    Or,
}

impl CompositeOp {
    /// Value every bit starts from before children are folded in.
    fn identity(self) -> bool {
        matches!(self, CompositeOp::And)
    }

    fn merge(self, acc: &mut BitSet, child: &BitSet) {
        match self {
            CompositeOp::And => acc.and(child),
            CompositeOp::Or => acc.or(child),
        }
    }
}

impl fmt::Display for CompositeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompositeOp::And => "AND",
            CompositeOp::Or => "OR",
        })
    }
}

#[derive(Debug, Clone)]
pub enum FilterKind {
    Composite(CompositeOp),
    Leaf(Leaf),
}

#[derive(Debug)]
struct FilterNode {
    kind: FilterKind,
    enabled: bool,
    color: u8,
    result: BitSet,
    children: Vec<FilterId>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<FilterNode>,
}

#[derive(Debug)]
pub struct FilterTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: FilterId,
}

impl Default for FilterTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTree {
    /// Tree holding only the enabled root AND.
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: FilterId {
                slot: 0,
                generation: 0,
            },
        };
        tree.root = tree.alloc(FilterNode {
            kind: FilterKind::Composite(CompositeOp::And),
            enabled: true,
            color: NO_COLOR,
            result: BitSet::new(0),
            children: Vec::new(),
        });
        tree
    }

    pub fn root(&self) -> FilterId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc(&mut self, node: FilterNode) -> FilterId {
        match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.node = Some(node);
                FilterId {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                FilterId {
                    slot: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn node(&self, id: FilterId) -> Option<&FilterNode> {
        self.slots
            .get(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: FilterId) -> Result<&mut FilterNode, FilterError> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(FilterError::UnknownFilter(id))
    }

    /// Append a new, disabled node under the composite `parent`.
    pub fn add(&mut self, parent: FilterId, kind: FilterKind) -> Result<FilterId, FilterError> {
        match self.node(parent) {
            None => return Err(FilterError::UnknownFilter(parent)),
            Some(node) if !matches!(node.kind, FilterKind::Composite(_)) => {
                return Err(FilterError::NotComposite(parent))
            }
            Some(_) => {}
        }

        let id = self.alloc(FilterNode {
            kind,
            enabled: false,
            color: NO_COLOR,
            result: BitSet::new(0),
            children: Vec::new(),
        });
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Parse predicate text into a leaf and append it under `parent`.
    ///
    /// Nothing is added when the text is malformed.
    pub fn add_leaf_text(
        &mut self,
        parent: FilterId,
        kind: LeafKind,
        text: &str,
        ignore_case: bool,
    ) -> Result<FilterId, FilterError> {
        let leaf = Leaf::parse(kind, text, ignore_case)?;
        self.add(parent, FilterKind::Leaf(leaf))
    }

    /// Detach `id` from wherever it sits in the tree and free its subtree.
    ///
    /// Returns false if `id` is the root or not in the tree.
    pub fn remove(&mut self, id: FilterId) -> bool {
        if id == self.root {
            return false;
        }
        let Some(parent) = self.find_parent(self.root, id) else {
            return false;
        };
        if let Ok(node) = self.node_mut(parent) {
            node.children.retain(|&c| c != id);
        }
        self.free_subtree(id);
        true
    }

    fn find_parent(&self, from: FilterId, target: FilterId) -> Option<FilterId> {
        let node = self.node(from)?;
        if node.children.contains(&target) {
            return Some(from);
        }
        node.children
            .iter()
            .find_map(|&child| self.find_parent(child, target))
    }

    fn free_subtree(&mut self, id: FilterId) {
        let children = match self.node_mut(id) {
            Ok(node) => std::mem::take(&mut node.children),
            Err(_) => return,
        };
        for child in children {
            self.free_subtree(child);
        }

        let slot = &mut self.slots[id.slot as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.slot);
    }

    pub fn set_enabled(&mut self, id: FilterId, enabled: bool) -> Result<(), FilterError> {
        self.node_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_color(&mut self, id: FilterId, color: u8) -> Result<(), FilterError> {
        self.node_mut(id)?.color = color;
        Ok(())
    }

    pub fn enabled(&self, id: FilterId) -> Option<bool> {
        self.node(id).map(|n| n.enabled)
    }

    pub fn color(&self, id: FilterId) -> Option<u8> {
        self.node(id).map(|n| n.color)
    }

    pub fn kind(&self, id: FilterId) -> Option<&FilterKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn children(&self, id: FilterId) -> &[FilterId] {
        self.node(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Result of the last computation of `id`.
    pub fn result(&self, id: FilterId) -> Option<&BitSet> {
        self.node(id).map(|n| &n.result)
    }

    /// Lines selected by the whole tree as of the last [`compute`].
    ///
    /// [`compute`]: FilterTree::compute
    pub fn selection(&self) -> &BitSet {
        self.result(self.root).unwrap_or(&EMPTY)
    }

    /// Re-evaluate every enabled node against `source`.
    ///
    /// Colors are cleared first, then painted by each colored node onto lines
    /// nobody colored before it; children are evaluated before their parent.
    pub fn compute(&mut self, source: &impl LineSource) -> &BitSet {
        let count = source.line_count();
        debug!(lines = count, nodes = self.len(), "computing filter tree");
        source.clear_colors();
        self.compute_node(self.root, source, count);
        self.selection()
    }

    fn compute_node(&mut self, id: FilterId, source: &impl LineSource, count: usize) {
        let Some(node) = self.node(id) else {
            return;
        };
        if !node.enabled {
            return;
        }

        let result = match &node.kind {
            FilterKind::Leaf(leaf) => leaf.evaluate(source),
            FilterKind::Composite(op) => {
                let op = *op;
                let children = node.children.clone();
                let mut acc = BitSet::new(count);
                acc.fill(op.identity());
                for child in children {
                    if self.enabled(child) != Some(true) {
                        continue;
                    }
                    self.compute_node(child, source, count);
                    if let Some(child) = self.node(child) {
                        op.merge(&mut acc, &child.result);
                    }
                }
                acc
            }
        };

        let Ok(node) = self.node_mut(id) else {
            return;
        };
        node.result = result;
        if node.color != NO_COLOR {
            for line in node.result.iter_ones() {
                source.compare_and_set_color(line, NO_COLOR, node.color);
            }
        }
    }

    /// Indented text rendering of the tree.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_node(self.root, 0, &mut out);
        out
    }

    fn describe_node(&self, id: FilterId, depth: usize, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        let _ = write!(out, "{:indent$}", "", indent = depth * 2);
        let _ = match &node.kind {
            FilterKind::Composite(op) => write!(out, "{}", op),
            FilterKind::Leaf(leaf) => write!(out, "{}", leaf),
        };
        if node.color != NO_COLOR {
            let _ = write!(out, " [color {}]", node.color);
        }
        if !node.enabled {
            out.push_str(" (disabled)");
        }
        out.push('\n');
        for &child in &node.children {
            self.describe_node(child, depth + 1, out);
        }
    }
}

static EMPTY: BitSet = BitSet::EMPTY;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{numbered_source, source_from_lines};

    fn selected(set: &BitSet) -> Vec<usize> {
        set.iter_ones().collect()
    }

    fn enabled_leaf(tree: &mut FilterTree, parent: FilterId, kind: LeafKind, text: &str) -> FilterId {
        let id = tree.add_leaf_text(parent, kind, text, false).unwrap();
        tree.set_enabled(id, true).unwrap();
        id
    }

    fn enabled_composite(tree: &mut FilterTree, parent: FilterId, op: CompositeOp) -> FilterId {
        let id = tree.add(parent, FilterKind::Composite(op)).unwrap();
        tree.set_enabled(id, true).unwrap();
        id
    }

    #[test]
    fn test_or_inside_and_with_range() {
        let source = source_from_lines(&["alpha", "beta", "alpha again"]);
        let mut tree = FilterTree::new();
        let root = tree.root();

        let or = enabled_composite(&mut tree, root, CompositeOp::Or);
        let a = enabled_leaf(&mut tree, or, LeafKind::Text, "alpha");
        let b = enabled_leaf(&mut tree, or, LeafKind::Text, "beta");
        enabled_leaf(&mut tree, root, LeafKind::Range, "0-1");

        assert_eq!(selected(tree.compute(&source)), vec![0, 1]);
        assert_eq!(selected(tree.result(a).unwrap()), vec![0, 2]);
        assert_eq!(selected(tree.result(b).unwrap()), vec![1]);
        assert_eq!(selected(tree.result(or).unwrap()), vec![0, 1, 2]);
        assert_eq!(tree.selection().count_ones(), 2);
    }

    #[test]
    fn test_empty_composites_use_identity() {
        let source = numbered_source(3);
        let mut tree = FilterTree::new();
        assert_eq!(selected(tree.compute(&source)), vec![0, 1, 2]);

        let root = tree.root();
        let or = enabled_composite(&mut tree, root, CompositeOp::Or);
        assert!(selected(tree.compute(&source)).is_empty());
        assert!(tree.result(or).unwrap().count_ones() == 0);
    }

    #[test]
    fn test_new_nodes_start_disabled_and_are_skipped() {
        let source = numbered_source(4);
        let mut tree = FilterTree::new();
        let root = tree.root();
        let leaf = tree
            .add_leaf_text(root, LeafKind::Text, "line 2", false)
            .unwrap();
        assert_eq!(tree.enabled(leaf), Some(false));

        assert_eq!(tree.compute(&source).count_ones(), 4);
        assert!(tree.result(leaf).unwrap().is_empty());

        tree.set_enabled(leaf, true).unwrap();
        assert_eq!(selected(tree.compute(&source)), vec![2]);
    }

    #[test]
    fn test_disabled_node_keeps_stale_result() {
        let source = numbered_source(2);
        let mut tree = FilterTree::new();
        let root = tree.root();
        let leaf = enabled_leaf(&mut tree, root, LeafKind::Text, "line");
        tree.compute(&source);
        assert_eq!(selected(tree.result(leaf).unwrap()), vec![0, 1]);

        tree.set_enabled(leaf, false).unwrap();
        let grown = numbered_source(5);
        assert_eq!(tree.compute(&grown).count_ones(), 5);
        assert_eq!(selected(tree.result(leaf).unwrap()), vec![0, 1]);
    }

    #[test]
    fn test_earlier_painter_wins() {
        let source = source_from_lines(&["alpha", "beta", "gamma"]);
        let mut tree = FilterTree::new();
        let root = tree.root();

        let or = enabled_composite(&mut tree, root, CompositeOp::Or);
        tree.set_color(or, 2).unwrap();
        let a = enabled_leaf(&mut tree, or, LeafKind::Text, "alpha");
        tree.set_color(a, 3).unwrap();
        let b = enabled_leaf(&mut tree, or, LeafKind::Text, "beta");
        tree.set_color(b, 4).unwrap();
        enabled_leaf(&mut tree, or, LeafKind::Text, "gamma");

        tree.compute(&source);
        assert_eq!(source.line(0).color, 3);
        assert_eq!(source.line(1).color, 4);
        assert_eq!(source.line(2).color, 2);

        // the first sibling to select a line keeps its color
        let both = enabled_leaf(&mut tree, root, LeafKind::Range, "0-2");
        tree.set_color(both, 9).unwrap();
        tree.compute(&source);
        assert_eq!(source.line(0).color, 3);
        assert_eq!(source.line(2).color, 2);
    }

    #[test]
    fn test_recompute_clears_stale_colors() {
        let source = numbered_source(3);
        let mut tree = FilterTree::new();
        let root = tree.root();
        let leaf = enabled_leaf(&mut tree, root, LeafKind::Range, "1");
        tree.set_color(leaf, 5).unwrap();

        tree.compute(&source);
        assert_eq!(source.line(1).color, 5);

        tree.set_enabled(leaf, false).unwrap();
        tree.compute(&source);
        assert_eq!(source.line(1).color, NO_COLOR);

        tree.set_enabled(leaf, true).unwrap();
        tree.compute(&source);
        assert!(tree.remove(leaf));
        tree.compute(&source);
        assert_eq!(source.line(1).color, NO_COLOR);
    }

    #[test]
    fn test_remove_searches_whole_tree() {
        let mut tree = FilterTree::new();
        let root = tree.root();
        let or = enabled_composite(&mut tree, root, CompositeOp::Or);
        let inner = enabled_composite(&mut tree, or, CompositeOp::And);
        let deep = enabled_leaf(&mut tree, inner, LeafKind::Thread, "7");
        let sibling = enabled_leaf(&mut tree, or, LeafKind::Thread, "8");
        assert_eq!(tree.len(), 5);

        assert!(tree.remove(deep));
        assert_eq!(tree.children(inner), &[] as &[FilterId]);
        assert!(!tree.remove(deep));

        assert!(tree.remove(or));
        assert_eq!(tree.len(), 1);
        assert!(tree.kind(inner).is_none());
        assert!(tree.kind(sibling).is_none());
        assert!(tree.children(root).is_empty());
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut tree = FilterTree::new();
        assert!(!tree.remove(tree.root()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_recycled_slot_does_not_alias_stale_id() {
        let mut tree = FilterTree::new();
        let root = tree.root();
        let old = enabled_leaf(&mut tree, root, LeafKind::Thread, "1");
        assert!(tree.remove(old));

        let new = enabled_leaf(&mut tree, root, LeafKind::Thread, "2");
        assert_ne!(old, new);
        assert!(tree.kind(old).is_none());
        assert!(!tree.remove(old));
        assert_eq!(tree.set_color(old, 1), Err(FilterError::UnknownFilter(old)));
        assert!(matches!(tree.kind(new), Some(FilterKind::Leaf(Leaf::Thread(2)))));
    }

    #[test]
    fn test_add_errors_leave_tree_unchanged() {
        let mut tree = FilterTree::new();
        let root = tree.root();
        let leaf = enabled_leaf(&mut tree, root, LeafKind::Thread, "1");

        assert_eq!(
            tree.add(leaf, FilterKind::Composite(CompositeOp::Or)),
            Err(FilterError::NotComposite(leaf))
        );
        let err = tree
            .add_leaf_text(root, LeafKind::Thread, "zero", false)
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidPredicate { .. }));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.children(root), &[leaf]);
    }

    #[test]
    fn test_describe() {
        let mut tree = FilterTree::new();
        let root = tree.root();
        let or = enabled_composite(&mut tree, root, CompositeOp::Or);
        tree.set_color(or, 2).unwrap();
        enabled_leaf(&mut tree, or, LeafKind::Text, "timeout");
        tree.add_leaf_text(root, LeafKind::Range, "0-9", false).unwrap();

        assert_eq!(
            tree.describe(),
            "AND\n  OR [color 2]\n    text \"timeout\"\n  lines 0..=9 (disabled)\n"
        );
    }
}
