//! The per-build event dispatcher.
//!
//! One dispatcher per tracked build. It turns the build's event stream
//! into [`ExecutionTree`] mutations: node creation and lookup,
//! deferred/duplicate handling, result derivation, recursive
//! skip-finishing, failure child synthesis, severity propagation and
//! output routing. All calls happen on the engine worker thread; the
//! dispatcher itself is free of locks and atomics.
//!
//! Dirty notifications produced by mutations accumulate in an internal
//! set the worker drains and coalesces once per quantum (see
//! [`crate::router`]).

use crate::config::EngineConfig;
use crate::contracts::{log_collaborator_failure, BuildLifecycle, OutputSink, TreePresenter};
use crate::dispatch::path_group::PathGrouper;
use crate::model::descriptor::BuildDescriptor;
use crate::model::event::{BuildEvent, EventKind, MessageSeverity};
use crate::model::id::{BuildId, EventId, FilterId, NodeId};
use crate::model::result::{EventResult, Failure, FilePosition, NodeResult};
use crate::tree::filter::NodePredicate;
use crate::tree::node::ProgressState;
use crate::tree::store::{ExecutionTree, Invalidation};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// State machine for a single build's event stream.
pub struct BuildDispatcher {
    build_id: BuildId,
    descriptor: BuildDescriptor,
    config: EngineConfig,
    tree: ExecutionTree,
    grouper: PathGrouper,

    sink: Arc<dyn OutputSink>,
    presenter: Arc<dyn TreePresenter>,
    lifecycle: Arc<dyn BuildLifecycle>,

    /// Events held back until the build's `StartBuild` is processed.
    deferred: VecDeque<BuildEvent>,
    /// Output for occurrences whose node does not exist yet.
    pending_output: HashMap<EventId, Vec<(String, bool)>>,

    build_started: bool,
    finished_build_received: bool,
    shown_first_error: bool,
    revealed_first_message: bool,
    selection_made: bool,
    finished_at: Option<Instant>,

    dirty: Vec<Invalidation>,
}

impl BuildDispatcher {
    pub fn new(
        descriptor: BuildDescriptor,
        config: EngineConfig,
        sink: Arc<dyn OutputSink>,
        presenter: Arc<dyn TreePresenter>,
        lifecycle: Arc<dyn BuildLifecycle>,
    ) -> Self {
        let grouper = PathGrouper::new(descriptor.working_dir.clone(), config.home_dir());
        Self {
            build_id: descriptor.id.clone(),
            descriptor,
            config,
            tree: ExecutionTree::new(),
            grouper,
            sink,
            presenter,
            lifecycle,
            deferred: VecDeque::new(),
            pending_output: HashMap::new(),
            build_started: false,
            finished_build_received: false,
            shown_first_error: false,
            revealed_first_message: false,
            selection_made: false,
            finished_at: None,
            dirty: Vec::new(),
        }
    }

    /// Dispatcher for a build whose `StartBuild` (and therefore
    /// descriptor) has not arrived yet.
    pub fn provisional(
        build_id: BuildId,
        config: EngineConfig,
        sink: Arc<dyn OutputSink>,
        presenter: Arc<dyn TreePresenter>,
        lifecycle: Arc<dyn BuildLifecycle>,
    ) -> Self {
        let descriptor = BuildDescriptor::new(build_id, "", "");
        Self::new(descriptor, config, sink, presenter, lifecycle)
    }

    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn descriptor(&self) -> &BuildDescriptor {
        &self.descriptor
    }

    pub fn tree(&self) -> &ExecutionTree {
        &self.tree
    }

    pub fn working_dir(&self) -> &Path {
        &self.descriptor.working_dir
    }

    pub fn is_finished(&self) -> bool {
        self.finished_build_received
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Drain the dirty notifications accumulated since the last call.
    pub fn take_dirty(&mut self) -> Vec<Invalidation> {
        std::mem::take(&mut self.dirty)
    }

    // ── Filters ──

    pub fn add_filter(&mut self, predicate: NodePredicate) -> FilterId {
        let id = self.tree.add_filter(predicate);
        self.dirty.push(Invalidation::subtree(self.tree.root()));
        id
    }

    pub fn remove_filter(&mut self, id: FilterId) -> bool {
        let removed = self.tree.remove_filter(id);
        if removed {
            self.dirty.push(Invalidation::subtree(self.tree.root()));
        }
        removed
    }

    // ── Event handling ──

    pub fn handle_event(&mut self, event: BuildEvent) {
        // Until the build's own start is processed, duplicate-aware
        // events are held back and replayed in arrival order.
        if event.duplicate_aware
            && !self.build_started
            && !matches!(event.kind, EventKind::StartBuild(_))
        {
            self.deferred.push_back(event);
            return;
        }
        self.apply(event);
    }

    fn apply(&mut self, event: BuildEvent) {
        let mut dirty: Vec<Invalidation> = Vec::new();
        let progress_root = self.tree.progress_root();

        if let EventKind::Output { stdout } = event.kind {
            self.route_output(&event, stdout);
            return;
        }

        // Resolve the declared parent; an unresolvable id degrades to
        // the build-progress root.
        let mut parent = match &event.parent_id {
            None => progress_root,
            Some(parent_id) => self.tree.lookup(parent_id).unwrap_or_else(|| {
                tracing::debug!(
                    "unresolved parent id {} for event {}, attaching under build root",
                    parent_id,
                    event.id
                );
                progress_root
            }),
        };

        if let EventKind::Message {
            file_position: Some(position),
            ..
        } = &event.kind
        {
            let file = position.file.clone();
            parent = self.group_parent(parent, &file, event.event_time_ms, &mut dirty);
        }

        let existing = self.tree.lookup(&event.id);
        let current: Option<NodeId> = match &event.kind {
            EventKind::Start | EventKind::StartBuild(_) | EventKind::Message { .. } => {
                if let Some(node) = existing {
                    let known = self
                        .tree
                        .get(node)
                        .map(|n| n.name().to_string())
                        .unwrap_or_default();
                    tracing::warn!(
                        "start event id collision found: {}, was also in node: {}",
                        event.id,
                        known
                    );
                    self.commit(dirty);
                    return;
                }
                if event.duplicate_aware
                    && self.finished_build_received
                    && self.tree.find_child_by_name(parent, &event.message).is_some()
                {
                    self.commit(dirty);
                    return;
                }
                let node = match &event.kind {
                    EventKind::StartBuild(descriptor) => {
                        let descriptor = descriptor.clone();
                        self.start_build(descriptor);
                        let root = self.tree.progress_root();
                        if !self.descriptor.title.is_empty() {
                            self.tree.node_mut(root).title = Some(self.descriptor.title.clone());
                        }
                        root
                    }
                    _ => {
                        let node = self.tree.alloc(parent);
                        dirty.push(Invalidation::subtree(parent));
                        node
                    }
                };
                self.tree.register(event.id.clone(), node);
                self.flush_pending_output(&event.id, node);
                Some(node)
            }
            EventKind::Progress {
                total,
                progress,
                unit,
            } => {
                let node = match existing {
                    Some(node) => node,
                    None => {
                        let node = self.tree.alloc(parent);
                        if parent == progress_root {
                            self.tree.node_mut(node).auto_expand = true;
                        }
                        self.tree.register(event.id.clone(), node);
                        self.flush_pending_output(&event.id, node);
                        dirty.push(Invalidation::subtree(parent));
                        node
                    }
                };
                self.tree.set_progress(
                    node,
                    ProgressState {
                        total: *total,
                        current: *progress,
                        unit: unit.clone(),
                    },
                );
                if node == progress_root {
                    if let Err(e) = self.presenter.update_progress(&self.build_id, *total, *progress)
                    {
                        log_collaborator_failure("tree presenter", e);
                    }
                }
                Some(node)
            }
            EventKind::Presentable(data) => match existing {
                Some(node) => Some(node),
                None => {
                    let node = self.tree.alloc(parent);
                    {
                        let n = self.tree.node_mut(node);
                        n.always_visible = true;
                        n.auto_expand = parent == progress_root;
                        n.icon = data.icon.clone();
                    }
                    self.tree.register(event.id.clone(), node);
                    self.flush_pending_output(&event.id, node);
                    dirty.push(Invalidation::subtree(parent));
                    if let Err(e) = self.sink.attach_presentation(&self.build_id, node, data) {
                        log_collaborator_failure("output sink", e);
                    }
                    Some(node)
                }
            },
            EventKind::Finish { .. } => match existing {
                Some(node) => Some(node),
                None => {
                    tracing::debug!("finish event for unknown occurrence {}, dropped", event.id);
                    None
                }
            },
            EventKind::FinishBuild { .. } => Some(existing.unwrap_or_else(|| {
                // The build's start never made it; finish the progress
                // root directly.
                self.tree.register(event.id.clone(), progress_root);
                progress_root
            })),
            EventKind::Output { .. } => None,
        };

        let Some(node) = current else {
            self.commit(dirty);
            return;
        };

        if !event.message.is_empty() {
            self.tree.node_mut(node).name = event.message.clone();
        }
        if let Some(hint) = &event.hint {
            self.tree.node_mut(node).hint = Some(hint.clone());
        }
        if self.tree.get(node).map(|n| n.start_time_ms()) == Some(0) {
            self.tree.node_mut(node).start_time_ms = event.event_time_ms;
        }

        // Message mutations run after the shared fields so that the
        // incremental re-filter sees the node's final name. A message
        // reaching this point is always newly created (id collisions
        // returned above).
        if let EventKind::Message {
            severity,
            file_position,
        } = &event.kind
        {
            self.apply_message(
                node,
                parent,
                *severity,
                file_position.clone(),
                &event,
                &mut dirty,
            );
        }

        if let EventKind::Finish { result } | EventKind::FinishBuild { result } = &event.kind {
            let result = result.clone();
            self.apply_finish(node, result, &event, &mut dirty);
        }

        let finishes_build = matches!(event.kind, EventKind::FinishBuild { .. });
        if finishes_build {
            self.finish_build(node, &event, &mut dirty);
        }

        if dirty.is_empty() {
            dirty.push(Invalidation::node(node));
        }
        self.commit(dirty);

        if matches!(event.kind, EventKind::StartBuild(_)) || finishes_build {
            self.replay_deferred();
        }
    }

    fn commit(&mut self, dirty: Vec<Invalidation>) {
        self.dirty.extend(dirty);
    }

    /// Replay held-back events in arrival order through the regular
    /// event path.
    fn replay_deferred(&mut self) {
        while let Some(event) = self.deferred.pop_front() {
            self.apply(event);
        }
    }

    fn start_build(&mut self, descriptor: BuildDescriptor) {
        self.build_started = true;
        if !descriptor.working_dir.as_os_str().is_empty() {
            self.grouper =
                PathGrouper::new(descriptor.working_dir.clone(), self.config.home_dir());
        }
        self.descriptor = descriptor;
        tracing::info!("build {} started: {}", self.build_id, self.descriptor.title);
        if let Err(e) = self.lifecycle.on_build_start(&self.descriptor) {
            log_collaborator_failure("build lifecycle", e);
        }
    }

    fn apply_message(
        &mut self,
        node: NodeId,
        parent: NodeId,
        severity: MessageSeverity,
        file_position: Option<FilePosition>,
        event: &BuildEvent,
        dirty: &mut Vec<Invalidation>,
    ) {
        {
            let n = self.tree.node_mut(node);
            n.always_leaf = file_position.is_some();
            n.navigation = file_position.clone();
        }
        if let Some(top) = self.tree.set_end_time(node, event.event_time_ms) {
            dirty.push(Invalidation::subtree(top));
        }
        if let Some(top) = self.tree.set_result(node, NodeResult::Message(severity)) {
            dirty.push(Invalidation::subtree(top));
        }

        // A file-scoped message also appears inline in the enclosing
        // console, separated by a line break; build-level chatter is not
        // double-printed into the root console.
        if parent != self.tree.progress_root() && self.config.echo_to_parent {
            let mut text = event.message.clone();
            text.push('\n');
            self.sink_append(parent, &text, true);
        }
        dirty.extend(self.tree.report_child_severity(parent, severity));
        self.sink_append(node, &event.message, true);

        if severity == MessageSeverity::Error {
            self.show_error_if_first(node, file_position);
        }
        if !self.revealed_first_message {
            self.revealed_first_message = true;
            if let Err(e) = self.presenter.reveal_node(&self.build_id, node) {
                log_collaborator_failure("tree presenter", e);
            }
        }
    }

    fn apply_finish(
        &mut self,
        node: NodeId,
        result: EventResult,
        event: &BuildEvent,
        dirty: &mut Vec<Invalidation>,
    ) {
        let resolved = match result {
            EventResult::Success => NodeResult::Success,
            EventResult::Skipped => NodeResult::Skipped,
            EventResult::Failure(failures) => NodeResult::Failure(failures),
            EventResult::Derived => self.resolve_derived(node),
        };
        let failures = match &resolved {
            NodeResult::Failure(failures) => failures.clone(),
            _ => Vec::new(),
        };
        if let Some(top) = self.tree.set_result(node, resolved) {
            dirty.push(Invalidation::subtree(top));
        }
        if let Some(top) = self.tree.set_end_time(node, event.event_time_ms) {
            dirty.push(Invalidation::subtree(top));
        }
        self.finish_children(node, dirty);
        for failure in &failures {
            self.add_child_failure_node(node, failure, &event.message, event.event_time_ms, dirty);
        }
    }

    /// Resolve a `Derived` result against the subtree at this moment:
    /// failed if any child is flagged failed, else the node's own result
    /// when it already failed, else success.
    fn resolve_derived(&self, node: NodeId) -> NodeResult {
        let any_failed_child = self
            .tree
            .children(node)
            .iter()
            .any(|c| self.tree.get(*c).map(|n| n.is_failed()).unwrap_or(false));
        if any_failed_child {
            return NodeResult::Failure(vec![Failure::default()]);
        }
        let n = match self.tree.get(node) {
            Some(n) => n,
            None => return NodeResult::Success,
        };
        if n.is_failed() {
            if let Some(result @ NodeResult::Failure(_)) = n.result() {
                return result.clone();
            }
            return NodeResult::Failure(vec![Failure::default()]);
        }
        NodeResult::Success
    }

    /// Recursively force-finish children still running with a `Skipped`
    /// result, top-down; already finished nodes are left untouched.
    fn finish_children(&mut self, node: NodeId, dirty: &mut Vec<Invalidation>) {
        let children: Vec<NodeId> = self.tree.children(node).to_vec();
        for child in children {
            let running = self
                .tree
                .get(child)
                .map(|n| n.is_running())
                .unwrap_or(false);
            if !running {
                continue;
            }
            self.finish_children(child, dirty);
            if let Some(top) = self.tree.set_result(child, NodeResult::Skipped) {
                dirty.push(Invalidation::subtree(top));
            }
        }
    }

    fn add_child_failure_node(
        &mut self,
        parent: NodeId,
        failure: &Failure,
        default_message: &str,
        event_time_ms: i64,
        dirty: &mut Vec<Invalidation>,
    ) {
        let title = failure.title(default_message);
        let mut attach = parent;
        if let Some(position) = &failure.file_position {
            let file = position.file.clone();
            attach = self.group_parent(parent, &file, event_time_ms, dirty);
        }

        // Repeated failures with the same rendered title accumulate in
        // one node instead of creating siblings.
        let node = match self.tree.find_child_by_name(attach, &title) {
            Some(node) => node,
            None => {
                let node = self.tree.alloc(attach);
                {
                    let n = self.tree.node_mut(node);
                    n.name = title.clone();
                    n.auto_expand = true;
                    if let Some(position) = &failure.file_position {
                        if position.line >= 0 {
                            n.hint = Some(format!(":{}", position.line + 1));
                        }
                    }
                }
                dirty.push(Invalidation::subtree(attach));
                dirty.extend(
                    self.tree
                        .report_child_severity(attach, MessageSeverity::Error),
                );
                node
            }
        };
        if let Some(position) = &failure.file_position {
            self.tree.node_mut(node).navigation = Some(position.clone());
        }

        let mut failures = match self.tree.get(node).and_then(|n| n.result()) {
            Some(NodeResult::Failure(list)) => list.clone(),
            _ => Vec::new(),
        };
        failures.push(failure.clone());
        match self.tree.set_result(node, NodeResult::Failure(failures)) {
            Some(top) => dirty.push(Invalidation::subtree(top)),
            None => dirty.push(Invalidation::subtree(attach)),
        }

        if let Err(e) = self.sink.append_failure(&self.build_id, node, failure) {
            log_collaborator_failure("output sink", e);
        }
        self.show_error_if_first(node, failure.file_position.clone());
    }

    fn finish_build(&mut self, node: NodeId, event: &BuildEvent, dirty: &mut Vec<Invalidation>) {
        self.finished_build_received = true;
        self.finished_at = Some(Instant::now());

        let time_text = format_event_time(event.event_time_ms);
        let hint = match &event.hint {
            Some(hint) => format!("{hint} at {time_text}"),
            None => format!("at {time_text}"),
        };
        self.tree.node_mut(node).hint = Some(hint);
        dirty.push(Invalidation::node(node));

        if !self.selection_made {
            self.selection_made = true;
            let root = self.tree.progress_root();
            if let Err(e) = self.presenter.select_node(&self.build_id, root, None, false) {
                log_collaborator_failure("tree presenter", e);
            }
        }
        if let Err(e) = self.presenter.stop_progress(&self.build_id) {
            log_collaborator_failure("tree presenter", e);
        }
        tracing::info!("build {} finished", self.build_id);
        if let Err(e) = self.lifecycle.on_build_finish(&self.descriptor) {
            log_collaborator_failure("build lifecycle", e);
        }
    }

    /// Fire the first-error selection exactly once per build.
    fn show_error_if_first(&mut self, node: NodeId, navigation: Option<FilePosition>) {
        if self.shown_first_error {
            return;
        }
        self.shown_first_error = true;
        self.revealed_first_message = true;
        self.selection_made = true;
        let navigate = self.config.navigate_to_first_error && navigation.is_some();
        if let Err(e) =
            self.presenter
                .select_node(&self.build_id, node, navigation.as_ref(), navigate)
        {
            log_collaborator_failure("tree presenter", e);
        }
    }

    /// Materialize (or reuse) the grouping chain for a file-scoped
    /// message/failure and return the node the message attaches under.
    fn group_parent(
        &mut self,
        base: NodeId,
        file: &Path,
        event_time_ms: i64,
        dirty: &mut Vec<Invalidation>,
    ) -> NodeId {
        let Some(segments) = self.grouper.segments(file) else {
            return base;
        };
        let mut cur = base;
        for segment in segments {
            let event_id = EventId::new(segment.key.clone());
            cur = match self.tree.lookup(&event_id) {
                Some(node) => node,
                None => {
                    let node = self.tree.alloc(cur);
                    {
                        let n = self.tree.node_mut(node);
                        n.name = segment.name.clone();
                        n.start_time_ms = event_time_ms;
                        if segment.is_file {
                            n.navigation = Some(FilePosition::file_only(file));
                        }
                    }
                    // Grouping nodes are born finished.
                    if let Some(top) = self.tree.set_end_time(node, event_time_ms) {
                        dirty.push(Invalidation::subtree(top));
                    }
                    self.tree.register(event_id, node);
                    dirty.push(Invalidation::subtree(cur));
                    node
                }
            };
        }
        cur
    }

    fn route_output(&mut self, event: &BuildEvent, stdout: bool) {
        match &event.parent_id {
            None => {
                let root = self.tree.progress_root();
                self.sink_append(root, &event.message, stdout);
            }
            Some(parent_id) => match self.tree.lookup(parent_id) {
                Some(node) => self.sink_append(node, &event.message, stdout),
                None => self
                    .pending_output
                    .entry(parent_id.clone())
                    .or_default()
                    .push((event.message.clone(), stdout)),
            },
        }
    }

    /// Route output buffered for an occurrence into its newly created
    /// node.
    fn flush_pending_output(&mut self, event_id: &EventId, node: NodeId) {
        if let Some(chunks) = self.pending_output.remove(event_id) {
            for (text, stdout) in chunks {
                self.sink_append(node, &text, stdout);
            }
        }
    }

    fn sink_append(&self, node: NodeId, text: &str, stdout: bool) {
        if let Err(e) = self.sink.append(&self.build_id, node, text, stdout) {
            log_collaborator_failure("output sink", e);
        }
    }
}

fn format_event_time(event_time_ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(event_time_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| event_time_ms.to_string())
}
