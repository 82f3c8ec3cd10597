//! One round: the [`RoundBuffer`] plus the ordered [`Phase`]s built
//! against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use cmix_group::Group;
use cmix_types::wire::{RoundInfo, Slot};
use cmix_types::{ErrorKind, NodeId, PhaseType, RoundId};
use num_bigint::BigUint;
use num_traits::One;
use parking_lot::Mutex;
use rand::RngCore;

use crate::base_key_store::BaseKeyStore;
use crate::graphs;
use crate::phase::Phase;
use crate::round_buffer::RoundBuffer;

/// A single pass of the precomputation/realtime pipeline for a fixed
/// batch.
///
/// Owns its [`RoundBuffer`] and its [`Phase`]s; addresses its own
/// position in a circuit by [`RoundId`] rather than holding a back
/// pointer to the [`crate::round_manager::RoundManager`] that owns it
/// (spec §9's cyclic-ownership note).
pub struct Round {
    id: RoundId,
    node_id: NodeId,
    topology: Vec<NodeId>,
    batch_size: u32,
    buffer: Arc<RoundBuffer>,
    phases: Vec<Arc<Phase>>,
    phase_index: HashMap<PhaseType, usize>,
    incoming_share: Arc<Mutex<BigUint>>,
    incoming_slots: Arc<Mutex<Vec<Slot>>>,
}

impl Round {
    /// Builds every phase this node runs for `info`, wired against a
    /// fresh [`RoundBuffer`]. Phases marked
    /// [`PhaseType::is_last_node_only`] are omitted unless `node_id` is
    /// the last entry of `info.topology`.
    ///
    /// `rng` seeds `PrecompGenerate`'s randomness and is consumed the
    /// first (and only) time that phase runs. `base_keys` is consulted
    /// by `RealDecrypt` once client slots arrive via
    /// [`Self::post_new_batch`].
    pub fn new(
        info: &RoundInfo,
        node_id: NodeId,
        group: Arc<Group>,
        rng: Box<dyn RngCore + Send>,
        base_keys: Arc<dyn BaseKeyStore>,
    ) -> Self {
        let is_last_node = info.is_last_node(node_id);
        let buffer = Arc::new(RoundBuffer::new(group, info.round_id, info.batch_size, is_last_node));
        let timeout = Duration::from_millis(info.resource_queue_timeout_millis as u64);

        let rng = Arc::new(Mutex::new(Some(rng)));
        let incoming_share = Arc::new(Mutex::new(BigUint::one()));
        let incoming_slots = Arc::new(Mutex::new(Vec::new()));

        let mut phases = Vec::new();
        let mut phase_index = HashMap::new();

        for phase_type in PhaseType::PRECOMP_SEQUENCE.into_iter().chain(PhaseType::REALTIME_SEQUENCE) {
            if phase_type.is_last_node_only() && !is_last_node {
                continue;
            }
            let buf = Arc::clone(&buffer);
            let run: Box<dyn Fn(&AtomicBool) -> Result<(), ErrorKind> + Send + Sync> = match phase_type {
                PhaseType::PrecompGenerate => {
                    let rng = Arc::clone(&rng);
                    Box::new(move |cancel| {
                        let rng = rng.lock().take().expect("PrecompGenerate runs at most once per round");
                        graphs::run_generate(Arc::clone(&buf), rng, cancel)
                    })
                }
                PhaseType::PrecompShare => {
                    let incoming_share = Arc::clone(&incoming_share);
                    Box::new(move |cancel| graphs::run_share(Arc::clone(&buf), incoming_share.lock().clone(), cancel))
                }
                PhaseType::PrecompDecrypt => Box::new(move |cancel| graphs::run_decrypt(Arc::clone(&buf), cancel)),
                PhaseType::PrecompPermute => Box::new(move |cancel| graphs::run_permute(Arc::clone(&buf), cancel)),
                PhaseType::PrecompReveal => Box::new(move |cancel| graphs::run_reveal(Arc::clone(&buf), cancel)),
                PhaseType::PrecompStrip => Box::new(move |cancel| graphs::run_strip(Arc::clone(&buf), cancel)),
                PhaseType::RealDecrypt => {
                    let incoming_slots = Arc::clone(&incoming_slots);
                    let base_keys = Arc::clone(&base_keys);
                    Box::new(move |cancel| {
                        let slots = incoming_slots.lock().clone();
                        graphs::run_real_decrypt(Arc::clone(&buf), slots, Arc::clone(&base_keys), cancel)
                    })
                }
                PhaseType::RealPermute => Box::new(move |cancel| graphs::run_real_permute(Arc::clone(&buf), cancel)),
                PhaseType::RealIdentify => {
                    Box::new(move |cancel| graphs::run_real_identify(Arc::clone(&buf), cancel))
                }
                PhaseType::RealEncrypt => Box::new(move |cancel| graphs::run_real_encrypt(Arc::clone(&buf), cancel)),
            };
            phase_index.insert(phase_type, phases.len());
            phases.push(Arc::new(Phase::new(phase_type, info.round_id, timeout, run)));
        }

        Self {
            id: info.round_id,
            node_id,
            topology: info.topology.clone(),
            batch_size: info.batch_size,
            buffer,
            phases,
            phase_index,
            incoming_share,
            incoming_slots,
        }
    }

    /// This round's id.
    pub fn id(&self) -> RoundId {
        self.id
    }

    /// This node's position in the round's circuit.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The round's ordered circuit.
    pub fn topology(&self) -> &[NodeId] {
        &self.topology
    }

    /// The round's declared batch size.
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// The round's cryptographic state.
    pub fn buffer(&self) -> &Arc<RoundBuffer> {
        &self.buffer
    }

    /// The phase for `phase_type`, if this node builds it.
    ///
    /// Returns `None` for `is_last_node_only` phases on a non-last node;
    /// the graph builder omits those phases entirely (§9).
    pub fn phase(&self, phase_type: PhaseType) -> Option<&Arc<Phase>> {
        self.phase_index.get(&phase_type).map(|&i| &self.phases[i])
    }

    /// Every phase this node builds, in execution order.
    pub fn phases(&self) -> &[Arc<Phase>] {
        &self.phases
    }

    /// Feeds the upstream node's partial `CypherPublicKey` contribution
    /// in before `PrecompShare` runs. The first node in a circuit never
    /// calls this; its `PrecompShare` runs with the identity.
    pub fn post_share_contribution(&self, incoming: BigUint) {
        *self.incoming_share.lock() = incoming;
    }

    /// Feeds real client slots in before `RealDecrypt` runs (the
    /// `PostNewBatch` message of §4.7).
    pub fn post_new_batch(&self, slots: Vec<Slot>) {
        *self.incoming_slots.lock() = slots;
    }

    /// Records a slot-local failure (`OutsideOfBatch` through
    /// `KmacMismatch`, per §7) without failing the round.
    pub fn record_client_failure(&self, index: u32, err: ErrorKind) {
        self.buffer.record_client_failure(index, err);
    }

    /// Every slot-local failure reported so far.
    pub fn client_failures(&self) -> Vec<(u32, ErrorKind)> {
        self.buffer.client_failures()
    }

    /// Zeroizes the round's buffer. Called by
    /// [`crate::round_manager::RoundManager::delete`].
    pub fn erase(&self) {
        self.buffer.erase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmix_graph::Chunk;
    use cmix_group::mod_inverse;
    use cmix_types::wire::NUM_ROUND_STATES;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use crate::streams::real_decrypt::RealDecryptStream;
    use crate::streams::real_encrypt::RealEncryptStream;
    use crate::streams::real_identify::RealIdentifyStream;
    use crate::streams::real_permute::RealPermuteStream;

    fn info(topology: Vec<NodeId>) -> RoundInfo {
        RoundInfo {
            round_id: RoundId::new(7),
            update_id: 0,
            state: 0,
            topology,
            batch_size: 4,
            resource_queue_timeout_millis: 5_000,
            timestamps: [0; NUM_ROUND_STATES],
        }
    }

    fn group() -> Arc<Group> {
        Arc::new(Group::new(BigUint::from(107u32), BigUint::from(4u32), BigUint::from(53u32)))
    }

    #[test]
    fn last_node_only_phases_omitted_on_non_last_node() {
        let node = NodeId::new(0);
        let round = Round::new(
            &info(vec![NodeId::new(0), NodeId::new(1)]),
            node,
            group(),
            Box::new(ChaCha20Rng::seed_from_u64(1)),
            Arc::new(crate::base_key_store::InMemoryBaseKeyStore::new()),
        );
        assert!(round.phase(PhaseType::PrecompStrip).is_none());
        assert!(round.phase(PhaseType::RealIdentify).is_none());
        assert!(round.phase(PhaseType::RealEncrypt).is_none());
        assert!(round.phase(PhaseType::PrecompGenerate).is_some());
    }

    #[test]
    fn last_node_builds_every_phase() {
        let node = NodeId::new(1);
        let round = Round::new(
            &info(vec![NodeId::new(0), NodeId::new(1)]),
            node,
            group(),
            Box::new(ChaCha20Rng::seed_from_u64(1)),
            Arc::new(crate::base_key_store::InMemoryBaseKeyStore::new()),
        );
        assert_eq!(round.phases().len(), 10);
    }

    /// A single-node, single-slot round seeded with spec §8.7's literal
    /// vector (`R=26, Y_R=69, S=77, Y_S=81, U=94, Y_U=87, V=18, Y_V=79,
    /// Z=13`), run over `group()`'s `p=107`. The strip invariant below
    /// holds for any subgroup order, so this reuses the suite's `q=53`
    /// test group rather than the spec's `q=5`.
    fn literal_vector_round() -> Arc<Round> {
        let node = NodeId::new(0);
        let round = Round::new(
            &{
                let mut i = info(vec![node]);
                i.batch_size = 1;
                i
            },
            node,
            group(),
            Box::new(ChaCha20Rng::seed_from_u64(42)),
            Arc::new(crate::base_key_store::InMemoryBaseKeyStore::new()),
        );
        let round = Arc::new(round);

        // PrecompGenerate, to populate the (single-slot) permutation
        // table; its random r/s/u/v/y_*/z are overwritten below with the
        // literal vector.
        round.phase(PhaseType::PrecompGenerate).unwrap().execute().unwrap();

        let buf = round.buffer();
        buf.r.set(0, BigUint::from(26u32));
        buf.y_r.set(0, BigUint::from(69u32));
        buf.s.set(0, BigUint::from(77u32));
        buf.y_s.set(0, BigUint::from(81u32));
        buf.u.set(0, BigUint::from(94u32));
        buf.y_u.set(0, BigUint::from(87u32));
        buf.v.set(0, BigUint::from(18u32));
        buf.y_v.set(0, BigUint::from(79u32));
        let z = BigUint::from(13u32);
        let z_inverse = mod_inverse(&z, buf.group().order()).unwrap();
        *buf.z.lock() = z;
        *buf.z_inverse.lock() = z_inverse;

        for phase_type in [
            PhaseType::PrecompShare,
            PhaseType::PrecompDecrypt,
            PhaseType::PrecompPermute,
            PhaseType::PrecompReveal,
            PhaseType::PrecompStrip,
        ] {
            round.phase(phase_type).unwrap().execute().unwrap();
        }
        round
    }

    /// Spec §8 property 6 / §8.7: the last node's `MessagePrecomputation`
    /// and `AdPrecomputation` invert the accumulated internode-key
    /// products, independent of the literal vector's other values.
    #[test]
    fn precomputation_strips_to_the_inverse_key_products() {
        let round = literal_vector_round();
        let group = round.buffer().group();
        let buf = round.buffer();
        let last = buf.last_node.as_ref().unwrap();

        let rs = group.mul(&buf.r.get(0), &buf.s.get(0));
        assert_eq!(group.mul(&last.message_precomputation.get(0), &rs), BigUint::from(1u32));

        let uv = group.mul(&buf.u.get(0), &buf.v.get(0));
        assert_eq!(group.mul(&last.ad_precomputation.get(0), &uv), BigUint::from(1u32));
    }

    /// Spec §8.7 / S1: running the realtime multiply chain on keys
    /// initialized to the identity recovers the client's plaintext
    /// message and associated-data bytes unchanged.
    #[test]
    fn realtime_recovers_plaintext_on_identity_keys() {
        let round = literal_vector_round();
        let buf = round.buffer();

        buf.keys_payload_a.set(0, BigUint::from(1u32));
        buf.keys_payload_b.set(0, BigUint::from(1u32));
        buf.ecr_payload_a.set(0, BigUint::from(31u32));
        buf.ecr_payload_b.set(0, BigUint::from(1u32));

        let chunk = Chunk::new(0, 1);
        RealDecryptStream::new(
            Arc::clone(buf),
            Vec::new(),
            Arc::new(crate::base_key_store::InMemoryBaseKeyStore::new()),
        )
        .multiply_in_keys(chunk)
        .unwrap();

        let real_permute = RealPermuteStream::new(Arc::clone(buf));
        real_permute.multiply_in_keys(chunk).unwrap();
        real_permute.permute_batch(chunk).unwrap();

        RealIdentifyStream::new(Arc::clone(buf)).identify(chunk).unwrap();
        RealEncryptStream::new(Arc::clone(buf)).encrypt(chunk).unwrap();

        assert_eq!(buf.ecr_payload_a.get(0), BigUint::from(31u32));
        assert_eq!(buf.ecr_payload_b.get(0), BigUint::from(1u32));
    }

    #[test]
    fn single_node_precomputation_runs_end_to_end() {
        let round = literal_vector_round();
        assert!(round.buffer().is_last_node());
    }

    /// Spec S3: a slot that fails a slot-local check (here, bytes that do
    /// not decode to a group element) is reported to the client-failure
    /// collector and does not fail the phase; other slots still complete.
    #[test]
    fn outside_of_group_slot_is_reported_and_does_not_fail_the_phase() {
        let node = NodeId::new(0);
        let base_keys = Arc::new(crate::base_key_store::InMemoryBaseKeyStore::new());
        base_keys.insert(b"client-ok".to_vec(), BigUint::from(99u32));
        let round = Round::new(
            &{
                let mut i = info(vec![node]);
                i.batch_size = 2;
                i
            },
            node,
            group(),
            Box::new(ChaCha20Rng::seed_from_u64(1)),
            base_keys,
        );

        let good_slot = cmix_types::wire::Slot {
            index: 0,
            sender_id: b"client-ok".to_vec(),
            salt: vec![7u8; 32],
            kmacs: Vec::new(),
            payload_a: BigUint::from(5u32).to_bytes_be(),
            payload_b: BigUint::from(5u32).to_bytes_be(),
            ..cmix_types::wire::Slot::empty(0)
        };
        // `p = 107`: any byte string encoding a value >= 107 does not
        // decode to a group element.
        let bad_slot = cmix_types::wire::Slot {
            index: 1,
            sender_id: b"client-ok".to_vec(),
            salt: vec![7u8; 32],
            kmacs: Vec::new(),
            payload_a: BigUint::from(200u32).to_bytes_be(),
            payload_b: BigUint::from(5u32).to_bytes_be(),
            ..cmix_types::wire::Slot::empty(1)
        };

        round.post_new_batch(vec![good_slot, bad_slot]);
        round.phase(PhaseType::RealDecrypt).unwrap().execute().unwrap();

        let failures = round.client_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 1);
        assert!(matches!(failures[0].1, ErrorKind::OutsideOfGroup { index: 1 }));
    }
}
