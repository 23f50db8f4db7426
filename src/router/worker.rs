//! The engine worker: the single writer behind every tree.
//!
//! Runs on a dedicated thread and drains the ingress queue in arrival
//! order. One drain quantum processes every message available right now,
//! then flushes the coalesced dirty sets to the presenter and publishes
//! fresh snapshots, so a storm of compiler diagnostics costs the
//! presentation layer O(distinct dirty nodes), not O(events).

use crate::config::EngineConfig;
use crate::contracts::{
    log_collaborator_failure, BuildEventObserver, BuildLifecycle, OutputSink, TreePresenter,
};
use crate::dispatch::dispatcher::BuildDispatcher;
use crate::model::event::{BuildEvent, EventKind};
use crate::model::id::{BuildId, FilterId, NodeId};
use crate::router::{decide_eviction, lock_snapshots, BuildSummary, Eviction};
use crate::tree::filter::NodePredicate;
use crate::tree::snapshot::TreeSnapshot;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Messages handled by the engine worker.
pub(crate) enum EngineMessage {
    Event {
        build: BuildId,
        event: BuildEvent,
    },
    AddFilter {
        build: BuildId,
        predicate: NodePredicate,
        reply: Sender<Option<FilterId>>,
    },
    RemoveFilter {
        build: BuildId,
        filter: FilterId,
    },
    Pin {
        build: BuildId,
    },
    Dispose {
        build: BuildId,
    },
    AddObserver(Arc<dyn BuildEventObserver>),
    Flush {
        ack: Sender<()>,
    },
    Shutdown,
}

/// Worker-side state: the displayed and pinned builds, disposed-build
/// tombstones and the registered observers.
pub(crate) struct RouterCore {
    config: EngineConfig,
    rx: Receiver<EngineMessage>,
    snapshots: Arc<Mutex<HashMap<BuildId, Arc<TreeSnapshot>>>>,
    running: Arc<AtomicBool>,

    sink: Arc<dyn OutputSink>,
    presenter: Arc<dyn TreePresenter>,
    lifecycle: Arc<dyn BuildLifecycle>,

    active: Vec<BuildDispatcher>,
    pinned: Vec<BuildDispatcher>,
    disposed: HashSet<BuildId>,
    observers: Vec<Arc<dyn BuildEventObserver>>,
}

impl RouterCore {
    pub(crate) fn new(
        config: EngineConfig,
        rx: Receiver<EngineMessage>,
        snapshots: Arc<Mutex<HashMap<BuildId, Arc<TreeSnapshot>>>>,
        running: Arc<AtomicBool>,
        sink: Arc<dyn OutputSink>,
        presenter: Arc<dyn TreePresenter>,
        lifecycle: Arc<dyn BuildLifecycle>,
    ) -> Self {
        Self {
            config,
            rx,
            snapshots,
            running,
            sink,
            presenter,
            lifecycle,
            active: Vec::new(),
            pinned: Vec::new(),
            disposed: HashSet::new(),
            observers: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) {
        tracing::info!("engine worker started");

        while self.running.load(Ordering::SeqCst) {
            let first = match self.rx.recv_timeout(Duration::from_millis(50)) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // One quantum: everything available right now.
            let mut acks = Vec::new();
            self.handle_message(first, &mut acks);
            while self.running.load(Ordering::SeqCst) {
                match self.rx.try_recv() {
                    Ok(message) => self.handle_message(message, &mut acks),
                    Err(_) => break,
                }
            }

            self.flush_dirty();
            for ack in acks {
                let _ = ack.send(());
            }
        }

        tracing::info!("engine worker stopped");
    }

    fn handle_message(&mut self, message: EngineMessage, acks: &mut Vec<Sender<()>>) {
        match message {
            EngineMessage::Event { build, event } => self.route_event(build, event),
            EngineMessage::AddFilter {
                build,
                predicate,
                reply,
            } => {
                let id = self
                    .dispatcher_mut(&build)
                    .map(|d| d.add_filter(predicate));
                let _ = reply.send(id);
            }
            EngineMessage::RemoveFilter { build, filter } => {
                if let Some(dispatcher) = self.dispatcher_mut(&build) {
                    dispatcher.remove_filter(filter);
                }
            }
            EngineMessage::Pin { build } => {
                if let Some(pos) = self.active.iter().position(|d| d.build_id() == &build) {
                    let dispatcher = self.active.remove(pos);
                    tracing::info!("build {} pinned away", build);
                    self.pinned.push(dispatcher);
                }
            }
            EngineMessage::Dispose { build } => {
                let before = self.active.len() + self.pinned.len();
                self.active.retain(|d| d.build_id() != &build);
                self.pinned.retain(|d| d.build_id() != &build);
                if self.active.len() + self.pinned.len() != before {
                    tracing::info!("build {} disposed", build);
                }
                lock_snapshots(&self.snapshots).remove(&build);
                self.disposed.insert(build);
            }
            EngineMessage::AddObserver(observer) => self.observers.push(observer),
            EngineMessage::Flush { ack } => acks.push(ack),
            EngineMessage::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn route_event(&mut self, build: BuildId, event: BuildEvent) {
        if self.disposed.contains(&build) {
            tracing::debug!("event for disposed build {}, dropped", build);
            return;
        }
        if let EventKind::StartBuild(descriptor) = &event.kind {
            let working_dir = descriptor.working_dir.clone();
            self.apply_eviction(&build, &working_dir);
        }

        if self.dispatcher_mut(&build).is_none() {
            // First sighting of this build id: allocate its subsystem.
            // Events arriving ahead of the build's own start still need
            // the per-build deferred queue to exist.
            let dispatcher = BuildDispatcher::provisional(
                build.clone(),
                self.config.clone(),
                Arc::clone(&self.sink),
                Arc::clone(&self.presenter),
                Arc::clone(&self.lifecycle),
            );
            self.active.push(dispatcher);
        }

        for observer in &self.observers {
            observer.on_event(&build, &event);
        }
        if let Some(dispatcher) = self.dispatcher_mut(&build) {
            dispatcher.handle_event(event);
        }
    }

    fn dispatcher_mut(&mut self, build: &BuildId) -> Option<&mut BuildDispatcher> {
        self.active
            .iter_mut()
            .chain(self.pinned.iter_mut())
            .find(|d| d.build_id() == build)
    }

    fn apply_eviction(&mut self, new_build: &BuildId, new_dir: &std::path::Path) {
        let summaries: Vec<BuildSummary> = self
            .active
            .iter()
            .filter(|d| d.build_id() != new_build)
            .map(|d| BuildSummary {
                id: d.build_id().clone(),
                finished_at: d.finished_at(),
                working_dir: d.working_dir().to_path_buf(),
            })
            .collect();
        match decide_eviction(
            &summaries,
            new_dir,
            self.config.recent_finish_threshold(),
            Instant::now(),
        ) {
            Eviction::None => {}
            Eviction::All => {
                for summary in &summaries {
                    self.evict(&summary.id);
                }
            }
            Eviction::One(id) => self.evict(&id),
        }
    }

    fn evict(&mut self, build: &BuildId) {
        tracing::info!("evicting finished build {}", build);
        self.active.retain(|d| d.build_id() != build);
        lock_snapshots(&self.snapshots).remove(build);
        self.disposed.insert(build.clone());
    }

    /// Coalesce and deliver the dirty sets accumulated this quantum,
    /// then publish fresh snapshots for the builds that changed.
    fn flush_dirty(&mut self) {
        for dispatcher in self.active.iter_mut().chain(self.pinned.iter_mut()) {
            let dirty = dispatcher.take_dirty();
            if dirty.is_empty() {
                continue;
            }
            let mut subtrees: HashSet<NodeId> = HashSet::new();
            let mut nodes: HashSet<NodeId> = HashSet::new();
            for invalidation in dirty {
                if invalidation.structure {
                    subtrees.insert(invalidation.node);
                } else {
                    nodes.insert(invalidation.node);
                }
            }
            let build = dispatcher.build_id().clone();
            for node in &subtrees {
                if let Err(e) = self.presenter.subtree_changed(&build, *node) {
                    log_collaborator_failure("tree presenter", e);
                }
            }
            for node in nodes.difference(&subtrees) {
                if let Err(e) = self.presenter.node_changed(&build, *node) {
                    log_collaborator_failure("tree presenter", e);
                }
            }
            let snapshot = Arc::new(TreeSnapshot::capture(dispatcher.tree()));
            lock_snapshots(&self.snapshots).insert(build, snapshot);
        }
    }
}
