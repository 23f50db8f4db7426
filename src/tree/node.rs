//! The execution node entity.
//!
//! Nodes are plain data owned by the [`ExecutionTree`](crate::tree::ExecutionTree)
//! arena; parent/child links are `NodeId` indices, never references, so
//! upward propagation walks are index lookups (no shared mutable
//! pointers). All mutation goes through the tree so that visible-children
//! bookkeeping stays consistent.

use crate::model::id::NodeId;
use crate::model::result::{FilePosition, NodeResult};
use crate::model::MessageSeverity;
use serde::{Deserialize, Serialize};

/// Progress counters reported for a node. Non-monotonic and out-of-range
/// values are tolerated; `total <= 0` or `progress <= 0` renders
/// indeterminate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub total: i64,
    pub current: i64,
    pub unit: String,
}

impl ProgressState {
    /// Whether the counters describe a determinate fraction.
    pub fn is_determinate(&self) -> bool {
        self.total > 0 && self.current > 0
    }
}

/// One entry in a build's execution tree.
#[derive(Debug, Clone)]
pub struct ExecutionNode {
    pub(crate) id: NodeId,
    /// Parent node (`NodeId::INVALID` only for the synthetic root).
    pub(crate) parent: NodeId,
    /// Full children list, in arrival order. Owned exclusively.
    pub(crate) children: Vec<NodeId>,
    /// Filter-aware projection of `children`; materialized lazily once a
    /// filter is installed, `None` before that. Always an order-preserving
    /// subsequence of `children`.
    pub(crate) visible_children: Option<Vec<NodeId>>,

    pub(crate) name: String,
    pub(crate) title: Option<String>,
    pub(crate) hint: Option<String>,
    /// Epoch ms; 0 while unset.
    pub(crate) start_time_ms: i64,
    /// Epoch ms; 0 while running.
    pub(crate) end_time_ms: i64,
    pub(crate) result: Option<NodeResult>,
    pub(crate) navigation: Option<FilePosition>,
    pub(crate) icon: Option<String>,
    pub(crate) progress: Option<ProgressState>,

    /// Never rendered with children (file-scoped messages).
    pub(crate) always_leaf: bool,
    /// Presentation hint for the renderer.
    pub(crate) auto_expand: bool,
    /// Exempt from filtering (build-progress roots, presentable nodes).
    pub(crate) always_visible: bool,

    // Aggregated from descendant messages; monotonically increasing for
    // the node's lifetime, reset only by subtree clear.
    pub(crate) error_count: u32,
    pub(crate) warning_count: u32,
    pub(crate) info_count: u32,
}

impl ExecutionNode {
    pub(crate) fn new(id: NodeId, parent: NodeId) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            visible_children: None,
            name: String::new(),
            title: None,
            hint: None,
            start_time_ms: 0,
            end_time_ms: 0,
            result: None,
            navigation: None,
            icon: None,
            progress: None,
            always_leaf: false,
            auto_expand: false,
            always_visible: false,
            error_count: 0,
            warning_count: 0,
            info_count: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn start_time_ms(&self) -> i64 {
        self.start_time_ms
    }

    pub fn end_time_ms(&self) -> i64 {
        self.end_time_ms
    }

    pub fn result(&self) -> Option<&NodeResult> {
        self.result.as_ref()
    }

    pub fn navigation(&self) -> Option<&FilePosition> {
        self.navigation.as_ref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn progress(&self) -> Option<&ProgressState> {
        self.progress.as_ref()
    }

    pub fn is_always_leaf(&self) -> bool {
        self.always_leaf
    }

    pub fn is_auto_expand(&self) -> bool {
        self.auto_expand
    }

    pub fn is_always_visible(&self) -> bool {
        self.always_visible
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn info_count(&self) -> u32 {
        self.info_count
    }

    /// A node is running until it gets an end time, unless it was
    /// skipped or failed outright.
    pub fn is_running(&self) -> bool {
        self.end_time_ms == 0
            && !matches!(
                self.result,
                Some(NodeResult::Skipped) | Some(NodeResult::Failure(_))
            )
    }

    /// Failed directly or through any descendant message of error
    /// severity.
    pub fn is_failed(&self) -> bool {
        self.error_count > 0 || matches!(self.result, Some(NodeResult::Failure(_)))
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
            || matches!(
                self.result,
                Some(NodeResult::Message(MessageSeverity::Warning))
            )
    }

    pub fn has_infos(&self) -> bool {
        self.info_count > 0
            || matches!(
                self.result,
                Some(NodeResult::Message(MessageSeverity::Info))
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Failure;

    #[test]
    fn test_running_state() {
        let mut node = ExecutionNode::new(NodeId(0), NodeId::INVALID);
        assert!(node.is_running());

        node.end_time_ms = 100;
        assert!(!node.is_running());
    }

    #[test]
    fn test_skipped_and_failed_are_not_running() {
        let mut node = ExecutionNode::new(NodeId(0), NodeId::INVALID);
        node.result = Some(NodeResult::Skipped);
        assert!(!node.is_running());

        node.result = Some(NodeResult::Failure(vec![Failure::new("boom")]));
        assert!(!node.is_running());
        assert!(node.is_failed());
    }

    #[test]
    fn test_failed_via_counter() {
        let mut node = ExecutionNode::new(NodeId(0), NodeId::INVALID);
        node.error_count = 1;
        assert!(node.is_failed());
    }

    #[test]
    fn test_warning_via_message_result() {
        let mut node = ExecutionNode::new(NodeId(0), NodeId::INVALID);
        node.result = Some(NodeResult::Message(MessageSeverity::Warning));
        assert!(node.has_warnings());
        assert_eq!(node.warning_count(), 0);
    }

    #[test]
    fn test_indeterminate_progress() {
        let progress = ProgressState {
            total: 0,
            current: 5,
            unit: "files".into(),
        };
        assert!(!progress.is_determinate());
        let progress = ProgressState {
            total: 10,
            current: 5,
            unit: "files".into(),
        };
        assert!(progress.is_determinate());
    }
}
