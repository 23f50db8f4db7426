//! The filter engine: composable predicates over execution nodes.
//!
//! A [`FilterSet`] holds the custom predicates installed by consumers
//! (e.g. "show successful steps", "show warnings"). The composite
//! visibility rule lives on the tree:
//!
//! ```text
//! visible(node) := node.always_visible
//!               || no filter installed
//!               || node.is_running() || node.is_failed()
//!               || any custom predicate matches
//! ```
//!
//! Running and failed nodes always pass an installed filter so that
//! collapsing filters can never hide live or broken work; removing the
//! last custom predicate uninstalls the filter entirely, at which point
//! the visible-children projections dematerialize and `visible == full`.

use crate::model::id::FilterId;
use crate::tree::node::ExecutionNode;
use std::fmt;
use std::sync::Arc;

/// A predicate over a node. Shared with the engine worker, so it must be
/// thread-safe.
pub type NodePredicate = Arc<dyn Fn(&ExecutionNode) -> bool + Send + Sync>;

/// The set of custom predicates currently installed on a tree.
#[derive(Default)]
pub struct FilterSet {
    next_id: u32,
    predicates: Vec<(FilterId, NodePredicate)>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a predicate, returning a handle for later removal.
    pub fn add(&mut self, predicate: NodePredicate) -> FilterId {
        let id = FilterId(self.next_id);
        self.next_id += 1;
        self.predicates.push((id, predicate));
        id
    }

    /// Remove a previously installed predicate. Returns false when the
    /// handle is unknown.
    pub fn remove(&mut self, id: FilterId) -> bool {
        let before = self.predicates.len();
        self.predicates.retain(|(fid, _)| *fid != id);
        self.predicates.len() != before
    }

    pub fn contains(&self, id: FilterId) -> bool {
        self.predicates.iter().any(|(fid, _)| *fid == id)
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether any custom predicate accepts the node.
    pub fn matches(&self, node: &ExecutionNode) -> bool {
        self.predicates.iter().any(|(_, p)| p(node))
    }
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSet")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}
