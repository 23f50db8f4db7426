//! The build event model.
//!
//! Events are immutable, tagged descriptions of one occurrence in a
//! build's lifecycle. Producers hand them to
//! [`BuildViewManager::on_event`](crate::router::BuildViewManager::on_event)
//! from any thread; the engine's worker applies them in arrival order.
//!
//! The closed [`EventKind`] sum type replaces the runtime type checks the
//! source system performed on event objects: the dispatcher matches
//! exhaustively, so an unhandled kind is a compile error rather than a
//! silently ignored `instanceof` branch.

use crate::model::descriptor::BuildDescriptor;
use crate::model::id::EventId;
use crate::model::result::{EventResult, FilePosition};
use serde::{Deserialize, Serialize};

/// Severity of a `Message` event.
///
/// Only `Error`, `Warning` and `Info` bump ancestor counters; `Statistics`
/// and `Simple` are display-only chatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
    Statistics,
    Simple,
}

impl MessageSeverity {
    /// Whether this severity participates in ancestor counter aggregation.
    #[inline]
    pub fn is_counted(self) -> bool {
        matches!(self, Self::Error | Self::Warning | Self::Info)
    }
}

/// Presentation payload of a `Presentable` event: the caller supplies an
/// icon and optionally its own inline console, so the node bypasses the
/// shared text console and is exempt from filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresentationData {
    /// Icon identifier, opaque to the engine.
    pub icon: Option<String>,
    /// Whether the caller attaches its own inline console to the node.
    pub has_console: bool,
}

/// Kind-specific payload of a build event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// An occurrence began.
    Start,
    /// The distinguished start of the build itself; carries the build
    /// descriptor and lands on the pre-allocated build-progress root.
    StartBuild(BuildDescriptor),
    /// An occurrence completed with the given result.
    Finish { result: EventResult },
    /// The build as a whole completed. Runs the full `Finish` transition
    /// on the build-progress root, then the build-level bookkeeping
    /// (deferred flush, duplicate suppression arming, progress stop).
    FinishBuild { result: EventResult },
    /// A progress tick. Only the build-progress root's progress drives
    /// the aggregate indicator; ticks for other nodes are stored but not
    /// surfaced.
    Progress {
        total: i64,
        progress: i64,
        unit: String,
    },
    /// A severity-bearing message. A message with a file position is
    /// grouped under a synthetic per-path chain and rendered as a leaf.
    Message {
        severity: MessageSeverity,
        file_position: Option<FilePosition>,
    },
    /// Raw process output, appended verbatim to the parent's console.
    Output { stdout: bool },
    /// A node with caller-supplied presentation (icon + inline console).
    Presentable(PresentationData),
}

/// One immutable occurrence in a build's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Occurrence identity, unique within the build.
    pub id: EventId,
    /// Logically enclosing occurrence; `None` attaches under the
    /// build-progress root.
    pub parent_id: Option<EventId>,
    /// Primary display text (node name, message text, or output chunk).
    pub message: String,
    /// Secondary display text.
    pub hint: Option<String>,
    /// Epoch milliseconds when the occurrence happened.
    pub event_time_ms: i64,
    /// When set, a re-delivery of the same rendered message under the
    /// same parent is suppressed once the build has fully finished.
    pub duplicate_aware: bool,
    pub kind: EventKind,
}

impl BuildEvent {
    pub fn new(id: impl Into<EventId>, message: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            message: message.into(),
            hint: None,
            event_time_ms: 0,
            duplicate_aware: false,
            kind,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<EventId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn at(mut self, event_time_ms: i64) -> Self {
        self.event_time_ms = event_time_ms;
        self
    }

    pub fn duplicate_aware(mut self) -> Self {
        self.duplicate_aware = true;
        self
    }

    /// Whether this event creates a node when its id is unknown
    /// (`Start`/`StartBuild`/`Message`; `Progress` and `Presentable`
    /// create lazily through their own paths).
    #[inline]
    pub fn is_starting(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Start | EventKind::StartBuild(_) | EventKind::Message { .. }
        )
    }
}
