//! The neutral structures a cMix core exposes at its network boundary.
//!
//! These are plain data, not tied to any particular wire encoding: the
//! library consuming this crate is expected to bring its own codec
//! (protobuf, bincode, ...). Every `bytes` field here must decode to an
//! element of the configured group; the core validates that on ingest,
//! not this crate.

use serde::{Deserialize, Serialize};

use crate::{NodeId, PhaseType, RoundId};

/// Number of lifecycle states tracked in [`RoundInfo::timestamps`].
pub const NUM_ROUND_STATES: usize = 8;

/// One client (or inter-node) slot's worth of keying material.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Slot {
    /// This slot's position within the batch.
    pub index: u32,
    /// The sending client's canonical id.
    pub sender_id: Vec<u8>,
    /// A 32-byte salt used to derive this client's per-round keys.
    pub salt: Vec<u8>,
    /// KMAC witnesses proving the client shares the node's base key.
    pub kmacs: Vec<Vec<u8>>,
    /// The message payload (payload-A track).
    pub payload_a: Vec<u8>,
    /// The associated-data payload (payload-B track).
    pub payload_b: Vec<u8>,
    /// Partial payload-A cypher text accumulated so far.
    pub partial_payload_a_cypher: Vec<u8>,
    /// Partial payload-B cypher text accumulated so far.
    pub partial_payload_b_cypher: Vec<u8>,
    /// Encrypted payload-A keys.
    pub encrypted_payload_a_keys: Vec<u8>,
    /// Encrypted payload-B keys.
    pub encrypted_payload_b_keys: Vec<u8>,
    /// This node's partial contribution to `CypherPublicKey`, sent only
    /// during `PrecompShare`.
    pub partial_round_public_cypher_key: Vec<u8>,
}

impl Slot {
    /// An empty slot at the given index, with every byte field absent.
    pub fn empty(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// The non-empty `bytes` fields that must decode to group elements,
    /// in a stable order.
    pub fn group_fields(&self) -> Vec<&[u8]> {
        [
            &self.payload_a,
            &self.payload_b,
            &self.partial_payload_a_cypher,
            &self.partial_payload_b_cypher,
            &self.encrypted_payload_a_keys,
            &self.encrypted_payload_b_keys,
            &self.partial_round_public_cypher_key,
        ]
        .into_iter()
        .map(Vec::as_slice)
        .filter(|b| !b.is_empty())
        .collect()
    }
}

/// A round's topology, batch size and lifecycle timestamps, as sent by
/// the orchestrating permissioning layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundInfo {
    /// The round's globally unique id.
    pub round_id: RoundId,
    /// Monotonically increasing version of this round-info record.
    pub update_id: u64,
    /// The round's current lifecycle state, as a raw tag.
    pub state: u8,
    /// The ordered circuit of nodes executing this round.
    pub topology: Vec<NodeId>,
    /// Number of real client slots in the batch.
    pub batch_size: u32,
    /// Per-phase timeout the resource queue enforces.
    pub resource_queue_timeout_millis: u32,
    /// Unix-millis timestamps of each lifecycle transition seen so far.
    pub timestamps: [u64; NUM_ROUND_STATES],
}

impl RoundInfo {
    /// `true` iff `node` is the first entry in the topology.
    pub fn is_first_node(&self, node: NodeId) -> bool {
        self.topology.first() == Some(&node)
    }

    /// `true` iff `node` is the last entry in the topology.
    pub fn is_last_node(&self, node: NodeId) -> bool {
        self.topology.last() == Some(&node)
    }

    /// The node that would send to `node` in the ring, if any.
    pub fn prev_node(&self, node: NodeId) -> Option<NodeId> {
        let pos = self.topology.iter().position(|&n| n == node)?;
        (pos > 0).then(|| self.topology[pos - 1])
    }

    /// The node `node` would send to in the ring, if any.
    pub fn next_node(&self, node: NodeId) -> Option<NodeId> {
        let pos = self.topology.iter().position(|&n| n == node)?;
        self.topology.get(pos + 1).copied()
    }
}

/// A batch of slots produced by one phase, en route to the next node or
/// to a gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Batch {
    /// The round this batch belongs to.
    pub round: RoundInfo,
    /// Which phase produced this batch.
    pub from_phase: PhaseType,
    /// The slots, in arbitrary order (order is not semantically
    /// meaningful except for `Permute`, which defines it explicitly).
    pub slots: Vec<Slot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_fields_skips_absent_bytes() {
        let mut slot = Slot::empty(3);
        slot.payload_a = vec![1, 2, 3];
        assert_eq!(slot.group_fields(), vec![&[1u8, 2, 3][..]]);
    }

    #[test]
    fn topology_neighbor_lookup() {
        let info = RoundInfo {
            round_id: RoundId::new(1),
            update_id: 0,
            state: 0,
            topology: vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)],
            batch_size: 4,
            resource_queue_timeout_millis: 1000,
            timestamps: [0; NUM_ROUND_STATES],
        };
        assert!(info.is_first_node(NodeId::new(0)));
        assert!(info.is_last_node(NodeId::new(2)));
        assert_eq!(info.next_node(NodeId::new(0)), Some(NodeId::new(1)));
        assert_eq!(info.prev_node(NodeId::new(2)), Some(NodeId::new(1)));
        assert_eq!(info.next_node(NodeId::new(2)), None);
    }
}
