//! Recording collaborator doubles.
//!
//! Thread-safe recorders for the engine's boundary traits, plus a sink
//! that always fails for error-isolation tests.

use buildvis_rs::contracts::{BuildEventObserver, BuildLifecycle, OutputSink, TreePresenter};
use buildvis_rs::model::{
    BuildDescriptor, BuildEvent, BuildId, Failure, FilePosition, NodeId, PresentationData,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct RecordingSink {
    pub appends: Mutex<Vec<(NodeId, String, bool)>>,
    pub failures: Mutex<Vec<(NodeId, String)>>,
    pub presentations: Mutex<Vec<NodeId>>,
}

impl RecordingSink {
    pub fn texts_for(&self, node: NodeId) -> Vec<String> {
        self.appends
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| *n == node)
            .map(|(_, text, _)| text.clone())
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn append(
        &self,
        _build: &BuildId,
        node: NodeId,
        text: &str,
        stdout: bool,
    ) -> anyhow::Result<()> {
        self.appends
            .lock()
            .unwrap()
            .push((node, text.to_string(), stdout));
        Ok(())
    }

    fn append_failure(
        &self,
        _build: &BuildId,
        node: NodeId,
        failure: &Failure,
    ) -> anyhow::Result<()> {
        self.failures
            .lock()
            .unwrap()
            .push((node, failure.title("")));
        Ok(())
    }

    fn attach_presentation(
        &self,
        _build: &BuildId,
        node: NodeId,
        _presentation: &PresentationData,
    ) -> anyhow::Result<()> {
        self.presentations.lock().unwrap().push(node);
        Ok(())
    }
}

/// Sink whose every call fails; processing must keep going regardless.
pub struct FailingSink;

impl OutputSink for FailingSink {
    fn append(&self, _: &BuildId, _: NodeId, _: &str, _: bool) -> anyhow::Result<()> {
        anyhow::bail!("console backend gone")
    }

    fn append_failure(&self, _: &BuildId, _: NodeId, _: &Failure) -> anyhow::Result<()> {
        anyhow::bail!("console backend gone")
    }

    fn attach_presentation(
        &self,
        _: &BuildId,
        _: NodeId,
        _: &PresentationData,
    ) -> anyhow::Result<()> {
        anyhow::bail!("console backend gone")
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub node_changes: Mutex<Vec<(BuildId, NodeId)>>,
    pub subtree_changes: Mutex<Vec<(BuildId, NodeId)>>,
    pub selections: Mutex<Vec<(NodeId, Option<FilePosition>, bool)>>,
    pub reveals: Mutex<Vec<NodeId>>,
    pub progress_updates: Mutex<Vec<(i64, i64)>>,
    pub progress_stopped: AtomicBool,
}

impl TreePresenter for RecordingPresenter {
    fn node_changed(&self, build: &BuildId, node: NodeId) -> anyhow::Result<()> {
        self.node_changes.lock().unwrap().push((build.clone(), node));
        Ok(())
    }

    fn subtree_changed(&self, build: &BuildId, node: NodeId) -> anyhow::Result<()> {
        self.subtree_changes
            .lock()
            .unwrap()
            .push((build.clone(), node));
        Ok(())
    }

    fn select_node(
        &self,
        _build: &BuildId,
        node: NodeId,
        navigation: Option<&FilePosition>,
        navigate: bool,
    ) -> anyhow::Result<()> {
        self.selections
            .lock()
            .unwrap()
            .push((node, navigation.cloned(), navigate));
        Ok(())
    }

    fn reveal_node(&self, _build: &BuildId, node: NodeId) -> anyhow::Result<()> {
        self.reveals.lock().unwrap().push(node);
        Ok(())
    }

    fn update_progress(&self, _build: &BuildId, total: i64, progress: i64) -> anyhow::Result<()> {
        self.progress_updates.lock().unwrap().push((total, progress));
        Ok(())
    }

    fn stop_progress(&self, _build: &BuildId) -> anyhow::Result<()> {
        self.progress_stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLifecycle {
    pub started: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<String>>,
}

impl BuildLifecycle for RecordingLifecycle {
    fn on_build_start(&self, descriptor: &BuildDescriptor) -> anyhow::Result<()> {
        self.started
            .lock()
            .unwrap()
            .push(descriptor.id.as_str().to_string());
        Ok(())
    }

    fn on_build_finish(&self, descriptor: &BuildDescriptor) -> anyhow::Result<()> {
        self.finished
            .lock()
            .unwrap()
            .push(descriptor.id.as_str().to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingObserver {
    pub seen: AtomicUsize,
}

impl BuildEventObserver for CountingObserver {
    fn on_event(&self, _build: &BuildId, _event: &BuildEvent) {
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}
