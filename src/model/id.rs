//! Identity types for the aggregation engine.
//!
//! `NodeId` is a newtype over `u32` that serves as a direct array index
//! into the per-build node arena, providing O(1) lookup. Build and event
//! identities are opaque strings assigned by the producer; synthetic
//! grouping nodes register under the absolute file path they group.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index into `ExecutionTree::nodes`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Opaque identity of one tracked build.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BuildId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BuildId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identity of one occurrence within a build.
///
/// Unique within its build. A `Finish` legitimately reuses the id of its
/// `Start`; the engine additionally mints ids for synthetic path-grouping
/// nodes from the absolute file path they represent, which is what makes
/// grouping-chain reuse a plain map lookup.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handle for an installed filter predicate, used to remove it later.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FilterId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!NodeId::INVALID.is_valid());
    }

    #[test]
    fn test_node_id_debug() {
        assert_eq!(format!("{:?}", NodeId(7)), "NodeId(7)");
        assert_eq!(format!("{:?}", NodeId::INVALID), "NodeId(INVALID)");
    }

    #[test]
    fn test_opaque_ids() {
        let build = BuildId::from("gradle:1");
        assert_eq!(build.as_str(), "gradle:1");
        let event = EventId::from("task :compileJava");
        assert_eq!(event.to_string(), "task :compileJava");
    }
}
