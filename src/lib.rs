//! # BuildVis-RS: Build-Event Aggregation Engine
//!
//! An in-memory engine that ingests an asynchronous, multi-producer
//! stream of build lifecycle events (starts, progress ticks, messages,
//! finishes, output) and maintains, per build, a consistent and
//! incrementally filtered tree of execution nodes, while several builds
//! run side by side and consumers mutate the visible filter set at any
//! time.
//!
//! ## Architecture
//!
//! - **Model**: immutable events, results and descriptors ([`model`])
//! - **Tree**: per-build node arena with filter-aware projections ([`tree`])
//! - **Dispatch**: the per-build state machine ([`dispatch`])
//! - **Router**: build-id routing, eviction and the single-writer worker
//!   thread ([`router`])
//! - **Contracts**: the narrow traits the presentation layer implements
//!   ([`contracts`])
//! - **Communication**: crossbeam channels for thread-safe ingress and
//!   handoff
//!
//! Producers call [`BuildViewManager::on_event`] from any thread; one
//! dedicated worker applies all mutations in arrival order, coalesces
//! dirty notifications per drain quantum and publishes immutable
//! [`TreeSnapshot`]s the renderer reconciles against at its own pace.
//!
//! ## Example
//!
//! ```ignore
//! use buildvis_rs::{
//!     config::EngineConfig,
//!     model::{BuildDescriptor, BuildEvent, EventKind, EventResult},
//!     router::BuildViewManager,
//! };
//!
//! let engine = BuildViewManager::new(EngineConfig::default());
//!
//! let descriptor = BuildDescriptor::new("gradle:1", "Build my-app", "/work/my-app");
//! engine.on_event(
//!     "gradle:1",
//!     BuildEvent::new("root", "my-app", EventKind::StartBuild(descriptor)),
//! );
//! engine.on_event(
//!     "gradle:1",
//!     BuildEvent::new(
//!         "root",
//!         "my-app",
//!         EventKind::FinishBuild { result: EventResult::Success },
//!     ),
//! );
//!
//! let snapshot = engine.snapshot(&"gradle:1".into()).unwrap();
//! ```

pub mod config;
pub mod contracts;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod router;
pub mod tree;

// Re-export commonly used types
pub use config::EngineConfig;
pub use contracts::{BuildEventObserver, BuildLifecycle, OutputSink, TreePresenter};
pub use dispatch::BuildDispatcher;
pub use error::{BuildVisError, Result};
pub use model::{
    BuildDescriptor, BuildEvent, BuildId, EventId, EventKind, EventResult, Failure, FilePosition,
    FilterId, MessageSeverity, NodeId, NodeResult, PresentationData,
};
pub use router::BuildViewManager;
pub use tree::{ExecutionTree, NodeSnapshot, TreeSnapshot};
