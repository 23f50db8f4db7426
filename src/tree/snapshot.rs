//! Immutable tree snapshots for renderers.
//!
//! The engine worker publishes a fresh snapshot for every build whose
//! tree changed during a drain quantum. Renderers traverse snapshots at
//! their own pace; they never see (or lock) the live tree, which stays
//! exclusive to the worker.

use crate::model::id::NodeId;
use crate::model::result::{FilePosition, NodeResult};
use crate::tree::node::ProgressState;
use crate::tree::store::ExecutionTree;
use serde::{Deserialize, Serialize};

/// Read-only copy of one execution node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub parent: NodeId,
    pub name: String,
    pub title: Option<String>,
    pub hint: Option<String>,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub result: Option<NodeResult>,
    pub navigation: Option<FilePosition>,
    pub icon: Option<String>,
    pub progress: Option<ProgressState>,
    pub running: bool,
    pub failed: bool,
    pub has_warnings: bool,
    pub error_count: u32,
    pub warning_count: u32,
    pub info_count: u32,
    pub always_leaf: bool,
    pub auto_expand: bool,
    pub always_visible: bool,
    pub children: Vec<NodeId>,
    /// Filter-aware projection, equal to `children` when no filter is
    /// installed.
    pub visible_children: Vec<NodeId>,
}

/// Read-only copy of one build's whole tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub root: NodeId,
    pub progress_root: NodeId,
    nodes: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    /// Copy the current state of a live tree.
    pub fn capture(tree: &ExecutionTree) -> Self {
        let nodes = tree
            .iter()
            .map(|node| NodeSnapshot {
                id: node.id(),
                parent: node.parent(),
                name: node.name().to_string(),
                title: node.title().map(str::to_string),
                hint: node.hint().map(str::to_string),
                start_time_ms: node.start_time_ms(),
                end_time_ms: node.end_time_ms(),
                result: node.result().cloned(),
                navigation: node.navigation().cloned(),
                icon: node.icon().map(str::to_string),
                progress: node.progress().cloned(),
                running: node.is_running(),
                failed: node.is_failed(),
                has_warnings: node.has_warnings(),
                error_count: node.error_count(),
                warning_count: node.warning_count(),
                info_count: node.info_count(),
                always_leaf: node.is_always_leaf(),
                auto_expand: node.is_auto_expand(),
                always_visible: node.is_always_visible(),
                children: tree.children(node.id()).to_vec(),
                visible_children: tree.visible_children(node.id()).to_vec(),
            })
            .collect();
        Self {
            root: tree.root(),
            progress_root: tree.progress_root(),
            nodes,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeSnapshot> {
        if id.is_valid() {
            self.nodes.get(id.index())
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeSnapshot> {
        self.nodes.iter()
    }

    /// Depth-first walk of the visible tree under `id`.
    pub fn walk_visible(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            if let Some(node) = self.get(cur) {
                for child in node.visible_children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }
}
