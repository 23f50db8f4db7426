//! Multi-build routing and the engine's public ingress.
//!
//! [`BuildViewManager`] is the handle producers and consumers talk to:
//! `on_event` is a non-blocking enqueue callable from any thread, and
//! every mutation is applied by a single dedicated worker thread that
//! drains the queue in arrival order (events for the same build are
//! therefore applied in enqueue order; events for different builds have
//! no mutual ordering guarantee).
//!
//! The worker also owns the eviction policy: a new build may replace
//! stale finished builds that ran in the same working directory, while
//! unrelated concurrent builds display side by side.

pub mod worker;

use crate::config::EngineConfig;
use crate::contracts::{BuildEventObserver, BuildLifecycle, OutputSink, TreePresenter};
use crate::model::event::BuildEvent;
use crate::model::id::{BuildId, FilterId};
use crate::router::worker::{EngineMessage, RouterCore};
use crate::tree::filter::NodePredicate;
use crate::tree::snapshot::TreeSnapshot;
use crossbeam_channel::{bounded, unbounded, Sender};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// What the eviction policy decided for a newly starting build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Eviction {
    None,
    All,
    One(BuildId),
}

/// The facts the policy needs about one displayed build.
#[derive(Debug, Clone)]
pub(crate) struct BuildSummary {
    pub id: BuildId,
    pub finished_at: Option<Instant>,
    pub working_dir: PathBuf,
}

/// Decide whether (and which) displayed builds a new build replaces.
///
/// Evict everything when the whole displayed set is finished, ran in the
/// new build's working directory and none of it finished within the
/// recency threshold; otherwise replace just a stale finished re-run of
/// the same directory; otherwise display side by side.
pub(crate) fn decide_eviction(
    existing: &[BuildSummary],
    new_dir: &Path,
    threshold: Duration,
    now: Instant,
) -> Eviction {
    if existing.is_empty() {
        return Eviction::None;
    }
    let all_finished = existing.iter().all(|b| b.finished_at.is_some());
    let all_same_dir = existing.iter().all(|b| b.working_dir == new_dir);
    let none_recent = existing.iter().all(|b| match b.finished_at {
        Some(finished) => now.duration_since(finished) >= threshold,
        None => true,
    });
    if all_finished && all_same_dir && none_recent {
        return Eviction::All;
    }
    if let Some(stale) = existing
        .iter()
        .find(|b| b.finished_at.is_some() && b.working_dir == new_dir)
    {
        return Eviction::One(stale.id.clone());
    }
    Eviction::None
}

pub(crate) fn lock_snapshots(
    snapshots: &Mutex<HashMap<BuildId, Arc<TreeSnapshot>>>,
) -> MutexGuard<'_, HashMap<BuildId, Arc<TreeSnapshot>>> {
    match snapshots.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Public handle to the aggregation engine.
///
/// Cheap to share behind an `Arc`; all methods are callable from any
/// thread. Dropping the manager shuts the worker down and joins it.
pub struct BuildViewManager {
    tx: Sender<EngineMessage>,
    snapshots: Arc<Mutex<HashMap<BuildId, Arc<TreeSnapshot>>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BuildViewManager {
    /// Engine with no collaborators wired up (events are still
    /// aggregated and snapshots published).
    pub fn new(config: EngineConfig) -> Self {
        Self::with_collaborators(config, Arc::new(()), Arc::new(()), Arc::new(()))
    }

    pub fn with_collaborators(
        config: EngineConfig,
        sink: Arc<dyn OutputSink>,
        presenter: Arc<dyn TreePresenter>,
        lifecycle: Arc<dyn BuildLifecycle>,
    ) -> Self {
        let (tx, rx) = unbounded();
        let snapshots: Arc<Mutex<HashMap<BuildId, Arc<TreeSnapshot>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));
        let core = RouterCore::new(
            config,
            rx,
            Arc::clone(&snapshots),
            Arc::clone(&running),
            sink,
            presenter,
            lifecycle,
        );
        let worker = std::thread::spawn(move || core.run());
        Self {
            tx,
            snapshots,
            running,
            worker: Some(worker),
        }
    }

    /// Ingress: enqueue one event for the given build. Non-blocking;
    /// events for vanished builds are dropped harmlessly by the worker.
    pub fn on_event(&self, build: impl Into<BuildId>, event: BuildEvent) {
        let _ = self.tx.send(EngineMessage::Event {
            build: build.into(),
            event,
        });
    }

    /// Install a filter predicate on a build's tree. Returns `None` when
    /// the build is unknown or the engine is shutting down.
    pub fn add_filter(
        &self,
        build: impl Into<BuildId>,
        predicate: NodePredicate,
    ) -> Option<FilterId> {
        let (reply, response) = bounded(1);
        self.tx
            .send(EngineMessage::AddFilter {
                build: build.into(),
                predicate,
                reply,
            })
            .ok()?;
        response.recv_timeout(Duration::from_secs(5)).ok().flatten()
    }

    pub fn remove_filter(&self, build: impl Into<BuildId>, filter: FilterId) {
        let _ = self.tx.send(EngineMessage::RemoveFilter {
            build: build.into(),
            filter,
        });
    }

    /// Detach a build from the displayed set while continuing to route
    /// its events.
    pub fn pin_build(&self, build: impl Into<BuildId>) {
        let _ = self.tx.send(EngineMessage::Pin {
            build: build.into(),
        });
    }

    /// Detach and drop a build's subtree; further events for the id are
    /// no-ops.
    pub fn dispose_build(&self, build: impl Into<BuildId>) {
        let _ = self.tx.send(EngineMessage::Dispose {
            build: build.into(),
        });
    }

    /// Register a passive observer that sees every routed event.
    pub fn add_observer(&self, observer: Arc<dyn BuildEventObserver>) {
        let _ = self.tx.send(EngineMessage::AddObserver(observer));
    }

    /// The most recently published snapshot of a build's tree.
    pub fn snapshot(&self, build: &BuildId) -> Option<Arc<TreeSnapshot>> {
        lock_snapshots(&self.snapshots).get(build).cloned()
    }

    /// Block until everything enqueued so far has been applied and
    /// flushed. Returns false on timeout or after shutdown.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let (ack, done) = bounded(1);
        if self.tx.send(EngineMessage::Flush { ack }).is_err() {
            return false;
        }
        done.recv_timeout(timeout).is_ok()
    }

    /// Stop the worker and join it.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BuildViewManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.tx.send(EngineMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, dir: &str, finished_ago: Option<Duration>, now: Instant) -> BuildSummary {
        BuildSummary {
            id: BuildId::from(id),
            finished_at: finished_ago.map(|ago| now - ago),
            working_dir: PathBuf::from(dir),
        }
    }

    #[test]
    fn test_no_builds_nothing_to_evict() {
        let now = Instant::now();
        let decision = decide_eviction(&[], Path::new("/p"), Duration::from_secs(1), now);
        assert_eq!(decision, Eviction::None);
    }

    #[test]
    fn test_stale_same_dir_set_evicts_all() {
        let now = Instant::now();
        let existing = vec![
            summary("a", "/p", Some(Duration::from_secs(2)), now),
            summary("b", "/p", Some(Duration::from_secs(5)), now),
        ];
        let decision = decide_eviction(&existing, Path::new("/p"), Duration::from_secs(1), now);
        assert_eq!(decision, Eviction::All);
    }

    #[test]
    fn test_recent_finish_evicts_only_the_rerun() {
        let now = Instant::now();
        let existing = vec![summary("a", "/p", Some(Duration::from_millis(100)), now)];
        let decision = decide_eviction(&existing, Path::new("/p"), Duration::from_secs(1), now);
        assert_eq!(decision, Eviction::One(BuildId::from("a")));
    }

    #[test]
    fn test_different_dir_coexists() {
        let now = Instant::now();
        let existing = vec![summary("a", "/p", Some(Duration::from_millis(100)), now)];
        let decision = decide_eviction(&existing, Path::new("/q"), Duration::from_secs(1), now);
        assert_eq!(decision, Eviction::None);
    }

    #[test]
    fn test_running_build_is_never_evicted() {
        let now = Instant::now();
        let existing = vec![
            summary("a", "/p", None, now),
            summary("b", "/p", Some(Duration::from_secs(5)), now),
        ];
        let decision = decide_eviction(&existing, Path::new("/p"), Duration::from_secs(1), now);
        // The running build blocks evict-all; the finished same-dir
        // re-run is still replaced.
        assert_eq!(decision, Eviction::One(BuildId::from("b")));
    }
}
