//! The per-build execution tree.
//!
//! Flat-storage arena: nodes live in a `Vec` indexed by `NodeId`, event
//! ids resolve through a `HashMap`, and parent/child links are ids. The
//! tree is only ever mutated by the engine worker (single-writer, see
//! [`crate::router`]); readers get immutable snapshots.
//!
//! Two roots are pre-allocated: a synthetic root (never displayed) and
//! the build-progress root every parentless occurrence attaches under.
//!
//! ## Incremental re-filtering
//!
//! Once a filter predicate is installed every node materializes a
//! visible-children projection. Mutations that can affect visibility
//! (result, end time, severity counters) go through
//! [`ExecutionTree::set_result`] / [`ExecutionTree::set_end_time`] /
//! [`ExecutionTree::report_child_severity`], which re-check only the
//! mutated node's membership at each ancestor and report the topmost
//! ancestor whose projection actually changed: one structure
//! notification per event, not one per level.

use crate::model::event::MessageSeverity;
use crate::model::id::{EventId, FilterId, NodeId};
use crate::model::result::NodeResult;
use crate::tree::filter::{FilterSet, NodePredicate};
use crate::tree::node::{ExecutionNode, ProgressState};
use std::collections::HashMap;

/// A dirty notification produced by a tree mutation: either the node's
/// own presentation changed, or the shape of its visible subtree did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Invalidation {
    pub node: NodeId,
    pub structure: bool,
}

impl Invalidation {
    pub fn node(node: NodeId) -> Self {
        Self {
            node,
            structure: false,
        }
    }

    pub fn subtree(node: NodeId) -> Self {
        Self {
            node,
            structure: true,
        }
    }
}

/// The tree of execution nodes for a single build.
#[derive(Debug)]
pub struct ExecutionTree {
    nodes: Vec<ExecutionNode>,
    by_event: HashMap<EventId, NodeId>,
    root: NodeId,
    progress_root: NodeId,
    filters: FilterSet,
}

impl Default for ExecutionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionTree {
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            by_event: HashMap::new(),
            root: NodeId::INVALID,
            progress_root: NodeId::INVALID,
            filters: FilterSet::new(),
        };
        let root = tree.alloc(NodeId::INVALID);
        tree.nodes[root.index()].always_visible = true;
        tree.nodes[root.index()].auto_expand = true;
        tree.root = root;

        let progress_root = tree.alloc(root);
        tree.nodes[progress_root.index()].always_visible = true;
        tree.nodes[progress_root.index()].auto_expand = true;
        tree.progress_root = progress_root;
        tree
    }

    /// The synthetic, never-displayed root.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The build-progress root all parentless occurrences attach under.
    #[inline]
    pub fn progress_root(&self) -> NodeId {
        self.progress_root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&ExecutionNode> {
        if id.is_valid() {
            self.nodes.get(id.index())
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ExecutionNode {
        &mut self.nodes[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.nodes.iter()
    }

    // ── Event id resolution ──

    pub fn lookup(&self, event_id: &EventId) -> Option<NodeId> {
        self.by_event.get(event_id).copied()
    }

    pub(crate) fn register(&mut self, event_id: EventId, node: NodeId) {
        self.by_event.insert(event_id, node);
    }

    // ── Structure ──

    /// Allocate a node under `parent` (`INVALID` only for the root).
    /// Appends to the parent's child list and, when a filter is
    /// installed, to its visible projection when the newcomer passes.
    pub(crate) fn alloc(&mut self, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut node = ExecutionNode::new(id, parent);
        if self.filter_installed() {
            node.visible_children = Some(Vec::new());
        }
        self.nodes.push(node);
        if parent.is_valid() {
            self.nodes[parent.index()].children.push(id);
            if self.nodes[parent.index()].visible_children.is_some() && self.is_visible_id(id) {
                // Appending keeps the projection an ordered subsequence:
                // the newcomer is also last in the full list.
                if let Some(list) = self.nodes[parent.index()].visible_children.as_mut() {
                    list.push(id);
                }
            }
        }
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// The filter-aware projection; equals the full list when no filter
    /// is installed.
    pub fn visible_children(&self, id: NodeId) -> &[NodeId] {
        let node = &self.nodes[id.index()];
        node.visible_children
            .as_deref()
            .unwrap_or(&node.children)
    }

    pub fn find_child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent.index()]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.index()].name == name)
    }

    /// Drop everything but the two roots and reset their aggregate state.
    pub fn clear(&mut self) {
        self.nodes.truncate(2);
        self.by_event.clear();
        for id in [self.root, self.progress_root] {
            let node = &mut self.nodes[id.index()];
            node.children.clear();
            node.error_count = 0;
            node.warning_count = 0;
            node.info_count = 0;
            node.result = None;
            node.end_time_ms = 0;
            node.progress = None;
            node.visible_children = None;
        }
        self.nodes[self.root.index()].children.push(self.progress_root);
        if self.filter_installed() {
            self.materialize_all();
        }
    }

    // ── Filtering ──

    #[inline]
    pub fn filter_installed(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Install a predicate. The first one materializes every node's
    /// visible projection; later ones trigger a full recompute.
    pub fn add_filter(&mut self, predicate: NodePredicate) -> FilterId {
        let id = self.filters.add(predicate);
        self.materialize_all();
        id
    }

    /// Remove a predicate. Removing the last one dematerializes the
    /// projections (no filter ⇒ visible list == full list).
    pub fn remove_filter(&mut self, id: FilterId) -> bool {
        if !self.filters.remove(id) {
            return false;
        }
        if self.filters.is_empty() {
            for node in &mut self.nodes {
                node.visible_children = None;
            }
        } else {
            self.materialize_all();
        }
        true
    }

    pub fn has_filter(&self, id: FilterId) -> bool {
        self.filters.contains(id)
    }

    fn materialize_all(&mut self) {
        for i in 0..self.nodes.len() {
            let recomputed = self.compute_visible(NodeId(i as u32));
            self.nodes[i].visible_children = Some(recomputed);
        }
    }

    fn compute_visible(&self, parent: NodeId) -> Vec<NodeId> {
        self.nodes[parent.index()]
            .children
            .iter()
            .copied()
            .filter(|c| self.is_visible_id(*c))
            .collect()
    }

    fn is_visible_id(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        node.always_visible
            || !self.filter_installed()
            || node.is_running()
            || node.is_failed()
            || self.filters.matches(node)
    }

    /// Re-check `child`'s membership in `parent`'s visible projection.
    /// Returns true when the projection changed. An addition re-scans the
    /// whole projection so membership order stays a subsequence of the
    /// child list; a removal is a single splice.
    fn refresh_membership(&mut self, parent: NodeId, child: NodeId) -> bool {
        let present = match self.nodes[parent.index()].visible_children.as_ref() {
            Some(list) => list.contains(&child),
            None => return false,
        };
        let should = self.is_visible_id(child);
        if should == present {
            return false;
        }
        if should {
            let recomputed = self.compute_visible(parent);
            self.nodes[parent.index()].visible_children = Some(recomputed);
        } else if let Some(list) = self.nodes[parent.index()].visible_children.as_mut() {
            if let Some(pos) = list.iter().position(|c| *c == child) {
                list.remove(pos);
            }
        }
        true
    }

    /// Walk from `id` upward, flipping membership where the mutation
    /// changed it, and return the topmost ancestor whose visible
    /// projection changed, which is the node the renderer must reconcile.
    pub(crate) fn reapply_parent_filter(&mut self, id: NodeId) -> Option<NodeId> {
        let mut topmost = None;
        let mut child = id;
        loop {
            let parent = self.nodes[child.index()].parent;
            if !parent.is_valid() {
                break;
            }
            if !self.refresh_membership(parent, child) {
                break;
            }
            topmost = Some(parent);
            child = parent;
        }
        topmost
    }

    // ── Visibility-affecting mutation ──

    /// Set the end time (at most once, clamped to the start time) and
    /// return the topmost ancestor whose projection changed.
    pub(crate) fn set_end_time(&mut self, id: NodeId, end_time_ms: i64) -> Option<NodeId> {
        let node = &mut self.nodes[id.index()];
        if node.end_time_ms != 0 {
            return None;
        }
        node.end_time_ms = end_time_ms.max(node.start_time_ms);
        self.reapply_parent_filter(id)
    }

    /// Set (or replace) the node result and return the topmost ancestor
    /// whose projection changed.
    pub(crate) fn set_result(&mut self, id: NodeId, result: NodeResult) -> Option<NodeId> {
        self.nodes[id.index()].result = Some(result);
        self.reapply_parent_filter(id)
    }

    pub(crate) fn set_progress(&mut self, id: NodeId, progress: ProgressState) {
        self.nodes[id.index()].progress = Some(progress);
    }

    /// Record one message of the given severity on every ancestor from
    /// `parent` up to (and including) the synthetic root, one increment
    /// per ancestor. Returns the dirty notifications the caller should
    /// forward: a subtree invalidation at the topmost changed ancestor
    /// where a counter bump flipped visibility, a node invalidation
    /// otherwise.
    pub(crate) fn report_child_severity(
        &mut self,
        parent: NodeId,
        severity: MessageSeverity,
    ) -> Vec<Invalidation> {
        let mut out = Vec::new();
        if !severity.is_counted() {
            return out;
        }
        let mut cur = parent;
        while cur.is_valid() {
            {
                let node = &mut self.nodes[cur.index()];
                match severity {
                    MessageSeverity::Error => node.error_count += 1,
                    MessageSeverity::Warning => node.warning_count += 1,
                    MessageSeverity::Info => node.info_count += 1,
                    MessageSeverity::Statistics | MessageSeverity::Simple => unreachable!(),
                }
            }
            match self.reapply_parent_filter(cur) {
                Some(top) => out.push(Invalidation::subtree(top)),
                None => out.push(Invalidation::node(cur)),
            }
            cur = self.nodes[cur.index()].parent;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Failure;
    use std::sync::Arc;

    fn named(tree: &mut ExecutionTree, parent: NodeId, name: &str) -> NodeId {
        let id = tree.alloc(parent);
        tree.node_mut(id).name = name.to_string();
        id
    }

    #[test]
    fn test_new_tree_has_two_roots() {
        let tree = ExecutionTree::new();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.children(tree.root()), &[tree.progress_root()]);
        assert!(tree.get(tree.progress_root()).unwrap().is_always_visible());
    }

    #[test]
    fn test_alloc_appends_in_order() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let a = named(&mut tree, root, "a");
        let b = named(&mut tree, root, "b");
        assert_eq!(tree.children(root), &[a, b]);
        assert_eq!(tree.get(a).unwrap().parent(), root);
    }

    #[test]
    fn test_event_registration() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let a = named(&mut tree, root, "a");
        tree.register(EventId::from("a"), a);
        assert_eq!(tree.lookup(&EventId::from("a")), Some(a));
        assert_eq!(tree.lookup(&EventId::from("b")), None);
    }

    #[test]
    fn test_no_filter_visible_equals_children() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let a = named(&mut tree, root, "a");
        let b = named(&mut tree, root, "b");
        assert_eq!(tree.visible_children(root), &[a, b]);
        assert!(!tree.filter_installed());
    }

    #[test]
    fn test_filter_hides_finished_successes() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let a = named(&mut tree, root, "a");
        let b = named(&mut tree, root, "b");
        tree.set_result(a, NodeResult::Success);
        tree.set_end_time(a, 10);

        // Only failed nodes pass once a never-matching predicate installs.
        let id = tree.add_filter(Arc::new(|_| false));
        // `b` is still running, so it stays; `a` finished successfully.
        assert_eq!(tree.visible_children(root), &[b]);

        tree.remove_filter(id);
        assert_eq!(tree.visible_children(root), &[a, b]);
    }

    #[test]
    fn test_visible_is_ordered_subsequence() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let ids: Vec<NodeId> = (0..5).map(|i| named(&mut tree, root, &format!("n{i}"))).collect();
        for id in &ids {
            tree.set_result(*id, NodeResult::Success);
            tree.set_end_time(*id, 1);
        }
        tree.add_filter(Arc::new(|n| n.name() == "n1" || n.name() == "n3"));
        assert_eq!(tree.visible_children(root), &[ids[1], ids[3]]);
    }

    #[test]
    fn test_result_change_reapplies_membership() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let a = named(&mut tree, root, "a");
        tree.add_filter(Arc::new(|_| false));
        // Running, therefore visible.
        assert_eq!(tree.visible_children(root), &[a]);

        // A successful result alone keeps it running (no end time yet).
        let top = tree.set_result(a, NodeResult::Success);
        assert_eq!(top, None);
        // The end time stops it; the change reports the parent as the
        // topmost affected node.
        let top = tree.set_end_time(a, 5);
        assert_eq!(top, Some(root));
        assert!(tree.visible_children(root).is_empty());

        // Failing brings it back, order preserved.
        let top = tree.set_result(a, NodeResult::Failure(vec![Failure::new("boom")]));
        assert_eq!(top, Some(root));
        assert_eq!(tree.visible_children(root), &[a]);
    }

    #[test]
    fn test_end_time_set_once_and_clamped() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let a = named(&mut tree, root, "a");
        tree.node_mut(a).start_time_ms = 100;
        tree.set_end_time(a, 50);
        assert_eq!(tree.get(a).unwrap().end_time_ms(), 100);
        tree.set_end_time(a, 500);
        assert_eq!(tree.get(a).unwrap().end_time_ms(), 100);
    }

    #[test]
    fn test_severity_propagates_to_all_ancestors() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let task = named(&mut tree, root, "task");
        let file = named(&mut tree, task, "main.rs");

        tree.report_child_severity(file, MessageSeverity::Error);
        assert_eq!(tree.get(file).unwrap().error_count(), 1);
        assert_eq!(tree.get(task).unwrap().error_count(), 1);
        assert_eq!(tree.get(root).unwrap().error_count(), 1);
        assert_eq!(tree.get(tree.root()).unwrap().error_count(), 1);

        tree.report_child_severity(file, MessageSeverity::Warning);
        assert_eq!(tree.get(task).unwrap().warning_count(), 1);
        assert_eq!(tree.get(task).unwrap().error_count(), 1);
    }

    #[test]
    fn test_uncounted_severities_do_not_propagate() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let out = tree.report_child_severity(root, MessageSeverity::Simple);
        assert!(out.is_empty());
        assert_eq!(tree.get(root).unwrap().info_count(), 0);
    }

    #[test]
    fn test_error_makes_hidden_node_reappear() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let task = named(&mut tree, root, "task");
        tree.set_result(task, NodeResult::Success);
        tree.set_end_time(task, 1);
        tree.add_filter(Arc::new(|_| false));
        assert!(tree.visible_children(root).is_empty());

        // An error under the finished task makes it failed, which must
        // re-add it to the projection and report the flip upward.
        let child = named(&mut tree, task, "late message");
        let invalidations = tree.report_child_severity(task, MessageSeverity::Error);
        let _ = child;
        assert!(invalidations.iter().any(|i| i.structure));
        assert_eq!(tree.visible_children(root), &[task]);
    }

    #[test]
    fn test_clear_resets_to_roots() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        let task = named(&mut tree, root, "task");
        tree.register(EventId::from("task"), task);
        tree.report_child_severity(task, MessageSeverity::Info);

        tree.clear();
        assert_eq!(tree.len(), 2);
        assert!(tree.children(tree.progress_root()).is_empty());
        assert_eq!(tree.get(tree.progress_root()).unwrap().info_count(), 0);
        assert_eq!(tree.lookup(&EventId::from("task")), None);
    }

    #[test]
    fn test_find_child_by_name() {
        let mut tree = ExecutionTree::new();
        let root = tree.progress_root();
        named(&mut tree, root, "compile");
        let link = named(&mut tree, root, "link");
        assert_eq!(tree.find_child_by_name(root, "link"), Some(link));
        assert_eq!(tree.find_child_by_name(root, "test"), None);
    }
}
