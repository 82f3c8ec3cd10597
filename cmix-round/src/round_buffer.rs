//! The per-round cryptographic state shared by every phase graph.

use std::sync::Arc;

use cmix_group::{Group, IntBuffer, PermutationTable};
use cmix_types::{ErrorKind, RoundId};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use parking_lot::Mutex;

/// Buffers that exist only on the last node of a circuit.
///
/// These hold the precomputations revealed by [`crate::streams::strip`]
/// and consumed during the realtime phases.
pub struct LastNodeBuffers {
    /// `(R · S)^{-1}` per slot, used by `RealEncrypt` to clear the
    /// accumulated message-track keys.
    pub message_precomputation: IntBuffer,
    /// `(U · V)^{-1}` per slot, used by `RealIdentify` to clear the
    /// accumulated associated-data-track keys.
    pub ad_precomputation: IntBuffer,
}

/// Every `IntBuffer` and piece of scratch state one round's precomputation
/// and realtime phases read from and write to.
///
/// A single `RoundBuffer` is shared (via `Arc`) by every phase stream
/// built for a round; phases never copy slot data between each other,
/// they mutate this buffer in place and forward chunk boundaries.
pub struct RoundBuffer {
    group: Arc<Group>,
    round_id: RoundId,
    batch_size: u32,

    /// Unpermuted message-track internode key, filled during `Generate`.
    pub r: IntBuffer,
    /// Permuted message-track internode key, filled during `Generate`.
    pub s: IntBuffer,
    /// Reserved internode key track. No phase in this implementation
    /// reads or writes `t`/`y_t`; they exist to keep the five-buffer
    /// shape `Generate` allocates symmetric with the upstream design.
    pub t: IntBuffer,
    /// Unpermuted associated-data-track internode key.
    pub u: IntBuffer,
    /// Permuted associated-data-track internode key.
    pub v: IntBuffer,

    /// Per-slot exponent paired with [`Self::r`].
    pub y_r: IntBuffer,
    /// Per-slot exponent paired with [`Self::s`].
    pub y_s: IntBuffer,
    /// Per-slot exponent paired with [`Self::t`].
    pub y_t: IntBuffer,
    /// Per-slot exponent paired with [`Self::u`].
    pub y_u: IntBuffer,
    /// Per-slot exponent paired with [`Self::v`].
    pub y_v: IntBuffer,

    /// This node's private round exponent, generated once (not per-slot)
    /// during `Generate`.
    pub z: Mutex<BigUint>,
    /// `mod_inverse(z, group.order())`, cached when `z` is set since
    /// `Reveal` needs it on every slot.
    pub z_inverse: Mutex<BigUint>,
    /// The team's combined public cypher key, `g^(sum of every node's z)`,
    /// completed by `Share`.
    pub cypher_public_key: Mutex<BigUint>,
    /// The permutation this node applies during `Permute`, generated
    /// during `Generate`.
    pub permutation: Mutex<Option<PermutationTable>>,

    /// Accumulated ElGamal key product for the message track, built up
    /// across `Decrypt` and `Permute`, finalized by `Reveal`+`Strip`.
    pub keys_msg: IntBuffer,
    /// Accumulated ElGamal cypher text for the message track.
    pub cypher_msg: IntBuffer,
    /// Accumulated ElGamal key product for the associated-data track.
    pub keys_ad: IntBuffer,
    /// Accumulated ElGamal cypher text for the associated-data track.
    pub cypher_ad: IntBuffer,

    /// The client-facing message payload cyphertext, ingested at
    /// `RealDecrypt` and progressively cleared through realtime.
    pub ecr_payload_a: IntBuffer,
    /// The client-facing associated-data payload cyphertext.
    pub ecr_payload_b: IntBuffer,
    /// Per-client message-track key, derived via `keygen` from the
    /// client's salt and base key at `RealDecrypt`.
    pub keys_payload_a: IntBuffer,
    /// Per-client associated-data-track key.
    pub keys_payload_b: IntBuffer,

    /// Populated only when this round buffer belongs to the last node
    /// in the circuit.
    pub last_node: Option<LastNodeBuffers>,

    /// Slot-local failures reported by a phase stream (§7: `OutsideOfBatch`
    /// through `KmacMismatch` are dropped and reported here rather than
    /// failing the phase). Lives on the buffer, not [`crate::round::Round`],
    /// since streams only ever see an `Arc<RoundBuffer>`.
    client_failures: Mutex<Vec<(u32, ErrorKind)>>,
}

impl RoundBuffer {
    /// Allocates a fresh round buffer for `batch_size` slots.
    ///
    /// `is_last_node` controls whether [`LastNodeBuffers`] are
    /// allocated; building the buffer this way means a non-last node
    /// never carries the extra precomputation buffers it has no
    /// operation that would populate.
    pub fn new(group: Arc<Group>, round_id: RoundId, batch_size: u32, is_last_node: bool) -> Self {
        let new_buf = || IntBuffer::new(batch_size as usize, BigUint::one());
        Self {
            group,
            round_id,
            batch_size,
            r: new_buf(),
            s: new_buf(),
            t: new_buf(),
            u: new_buf(),
            v: new_buf(),
            y_r: new_buf(),
            y_s: new_buf(),
            y_t: new_buf(),
            y_u: new_buf(),
            y_v: new_buf(),
            z: Mutex::new(BigUint::one()),
            z_inverse: Mutex::new(BigUint::one()),
            cypher_public_key: Mutex::new(BigUint::one()),
            permutation: Mutex::new(None),
            keys_msg: IntBuffer::from_values(vec![BigUint::one(); batch_size as usize]),
            cypher_msg: IntBuffer::from_values(vec![BigUint::one(); batch_size as usize]),
            keys_ad: IntBuffer::from_values(vec![BigUint::one(); batch_size as usize]),
            cypher_ad: IntBuffer::from_values(vec![BigUint::one(); batch_size as usize]),
            ecr_payload_a: new_buf(),
            ecr_payload_b: new_buf(),
            keys_payload_a: IntBuffer::from_values(vec![BigUint::one(); batch_size as usize]),
            keys_payload_b: IntBuffer::from_values(vec![BigUint::one(); batch_size as usize]),
            last_node: is_last_node.then(|| LastNodeBuffers {
                message_precomputation: new_buf(),
                ad_precomputation: new_buf(),
            }),
            client_failures: Mutex::new(Vec::new()),
        }
    }

    /// Records a slot-local failure without failing the phase it occurred
    /// in.
    pub fn record_client_failure(&self, index: u32, err: ErrorKind) {
        self.client_failures.lock().push((index, err));
    }

    /// Every slot-local failure reported so far.
    pub fn client_failures(&self) -> Vec<(u32, ErrorKind)> {
        self.client_failures.lock().clone()
    }

    /// The group every cryptop in this round operates over.
    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    /// This round's id, mixed into every `keygen` derivation.
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    /// This round's declared batch size.
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// `true` iff this buffer carries [`LastNodeBuffers`].
    pub fn is_last_node(&self) -> bool {
        self.last_node.is_some()
    }

    /// Overwrites every slot this round holds with `0`, dropping the last
    /// reference to the round's private exponent, permutation, and key
    /// material.
    ///
    /// `num_bigint::BigUint` has no `zeroize::Zeroize` impl, so this is a
    /// manual overwrite rather than a derive; it gives the same
    /// best-effort guarantee the round manager's `Delete` expects (§4.6).
    pub fn erase(&self) {
        let zero_buf = |buf: &IntBuffer| {
            for i in 0..buf.len() {
                buf.set(i, BigUint::zero());
            }
        };
        for buf in [
            &self.r, &self.s, &self.t, &self.u, &self.v, &self.y_r, &self.y_s, &self.y_t, &self.y_u, &self.y_v,
            &self.keys_msg, &self.cypher_msg, &self.keys_ad, &self.cypher_ad, &self.ecr_payload_a,
            &self.ecr_payload_b, &self.keys_payload_a, &self.keys_payload_b,
        ] {
            zero_buf(buf);
        }
        *self.z.lock() = BigUint::zero();
        *self.z_inverse.lock() = BigUint::zero();
        *self.cypher_public_key.lock() = BigUint::zero();
        *self.permutation.lock() = None;
        if let Some(last) = &self.last_node {
            zero_buf(&last.message_precomputation);
            zero_buf(&last.ad_precomputation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Arc<Group> {
        Arc::new(Group::new(
            BigUint::from(107u32),
            BigUint::from(4u32),
            BigUint::from(53u32),
        ))
    }

    #[test]
    fn erase_zeroes_every_buffer() {
        let buf = RoundBuffer::new(group(), RoundId::new(1), 2, true);
        buf.r.set(0, BigUint::from(9u32));
        *buf.z.lock() = BigUint::from(3u32);
        *buf.permutation.lock() = Some(cmix_group::PermutationTable::new(vec![1, 0]));
        buf.erase();
        assert_eq!(buf.r.get(0), BigUint::zero());
        assert_eq!(*buf.z.lock(), BigUint::zero());
        assert!(buf.permutation.lock().is_none());
    }

    #[test]
    fn last_node_buffers_only_allocated_when_requested() {
        let buf = RoundBuffer::new(group(), RoundId::new(1), 4, false);
        assert!(!buf.is_last_node());
        let last = RoundBuffer::new(group(), RoundId::new(1), 4, true);
        assert!(last.is_last_node());
    }

    #[test]
    fn key_and_cypher_tracks_start_at_identity() {
        let buf = RoundBuffer::new(group(), RoundId::new(1), 3, false);
        for i in 0..3 {
            assert_eq!(buf.keys_msg.get(i), BigUint::one());
            assert_eq!(buf.cypher_ad.get(i), BigUint::one());
        }
    }
}
