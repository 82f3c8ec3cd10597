//! Thin, `Display`-able wrappers around the core's primitive identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The globally unique identifier of a round.
///
/// Monotonically increasing; keys the round manager's map and tags
/// every inter-node message for that round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(u64);

/// The identifier of a node within a circuit's topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl RoundId {
    /// Wraps a raw round id.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw `u64`.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl NodeId {
    /// Wraps a raw node id (its position within a circuit).
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw `u32`.
    pub fn into_inner(self) -> u32 {
        self.0
    }
}

impl From<u64> for RoundId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}
