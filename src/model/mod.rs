//! Data model: identities, events, results and build descriptors.
//!
//! Everything in this module is plain immutable data. The mutable state
//! lives in [`crate::tree`] and is only ever touched by the engine worker.

pub mod descriptor;
pub mod event;
pub mod id;
pub mod result;

pub use descriptor::BuildDescriptor;
pub use event::{BuildEvent, EventKind, MessageSeverity, PresentationData};
pub use id::{BuildId, EventId, FilterId, NodeId};
pub use result::{EventResult, Failure, FilePosition, NodeResult};
