//! Boundary contracts between the engine and its collaborators.
//!
//! The engine is purely an in-memory aggregation layer: text consoles,
//! tree widgets and window management live outside it and are reached
//! through the narrow traits in this module. Collaborator calls are
//! fallible; failures are logged at the call boundary and never abort
//! event processing (a broken renderer must not take the build stream
//! down with it).
//!
//! All traits are `Send + Sync`: collaborators are shared with the
//! engine worker thread.

use crate::model::descriptor::BuildDescriptor;
use crate::model::event::{BuildEvent, PresentationData};
use crate::model::id::{BuildId, NodeId};
use crate::model::result::{Failure, FilePosition};

/// Receives per-node textual output.
///
/// If no console exists yet for a node, the implementation must buffer
/// until one is created; the engine does not retry.
#[cfg_attr(test, mockall::automock)]
pub trait OutputSink: Send + Sync {
    /// Append raw text to the node's console.
    fn append(&self, build: &BuildId, node: NodeId, text: &str, stdout: bool)
        -> anyhow::Result<()>;

    /// Hand a structured failure to the node's console.
    fn append_failure(&self, build: &BuildId, node: NodeId, failure: &Failure)
        -> anyhow::Result<()>;

    /// A presentable node brings its own inline console/icon.
    fn attach_presentation(
        &self,
        build: &BuildId,
        node: NodeId,
        presentation: &PresentationData,
    ) -> anyhow::Result<()>;
}

/// Receives coalesced dirty notifications and selection requests. The
/// presenter reconciles asynchronously against the published
/// [`TreeSnapshot`](crate::tree::TreeSnapshot)s at its own pace.
pub trait TreePresenter: Send + Sync {
    /// The node's own presentation (name, hint, status, counters) changed.
    fn node_changed(&self, build: &BuildId, node: NodeId) -> anyhow::Result<()>;

    /// The shape of the node's visible subtree changed.
    fn subtree_changed(&self, build: &BuildId, node: NodeId) -> anyhow::Result<()>;

    /// Select the node; emitted at most once per build, on the first
    /// error. `navigate` reflects the engine configuration.
    fn select_node(
        &self,
        build: &BuildId,
        node: NodeId,
        navigation: Option<&FilePosition>,
        navigate: bool,
    ) -> anyhow::Result<()>;

    /// Make the node visible (scroll into view); emitted at most once
    /// per build, for the first message.
    fn reveal_node(&self, build: &BuildId, node: NodeId) -> anyhow::Result<()>;

    /// Aggregate progress of the build-progress root.
    fn update_progress(&self, build: &BuildId, total: i64, progress: i64) -> anyhow::Result<()>;

    /// The build finished; stop any progress indicator.
    fn stop_progress(&self, build: &BuildId) -> anyhow::Result<()>;
}

/// Advisory notifications to the owning window-management layer.
#[cfg_attr(test, mockall::automock)]
pub trait BuildLifecycle: Send + Sync {
    fn on_build_start(&self, descriptor: &BuildDescriptor) -> anyhow::Result<()>;
    fn on_build_finish(&self, descriptor: &BuildDescriptor) -> anyhow::Result<()>;
}

/// Passive fan-out of every event routed to a live build, in applied
/// order. Observers must not block.
pub trait BuildEventObserver: Send + Sync {
    fn on_event(&self, build: &BuildId, event: &BuildEvent);
}

// No-op implementations for embedders that only want a subset of the
// collaborators wired up.

impl OutputSink for () {
    fn append(&self, _: &BuildId, _: NodeId, _: &str, _: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn append_failure(&self, _: &BuildId, _: NodeId, _: &Failure) -> anyhow::Result<()> {
        Ok(())
    }

    fn attach_presentation(
        &self,
        _: &BuildId,
        _: NodeId,
        _: &PresentationData,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

impl TreePresenter for () {
    fn node_changed(&self, _: &BuildId, _: NodeId) -> anyhow::Result<()> {
        Ok(())
    }

    fn subtree_changed(&self, _: &BuildId, _: NodeId) -> anyhow::Result<()> {
        Ok(())
    }

    fn select_node(
        &self,
        _: &BuildId,
        _: NodeId,
        _: Option<&FilePosition>,
        _: bool,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn reveal_node(&self, _: &BuildId, _: NodeId) -> anyhow::Result<()> {
        Ok(())
    }

    fn update_progress(&self, _: &BuildId, _: i64, _: i64) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop_progress(&self, _: &BuildId) -> anyhow::Result<()> {
        Ok(())
    }
}

impl BuildLifecycle for () {
    fn on_build_start(&self, _: &BuildDescriptor) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_build_finish(&self, _: &BuildDescriptor) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Log a collaborator failure without letting it escape the boundary.
pub(crate) fn log_collaborator_failure(what: &str, err: anyhow::Error) {
    tracing::warn!("{} collaborator failed: {:#}", what, err);
}
