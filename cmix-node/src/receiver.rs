//! The inter-node receive contract (spec §4.7): validates an incoming
//! phase message, feeds its slots into the round, and advances state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cmix_round::{PhaseState, ResourceQueue, Round, RoundManager};
use cmix_types::wire::Slot;
use cmix_types::{ErrorKind, NodeId, PhaseType, RoundId, RoundState};
use parking_lot::Mutex;

use crate::state::NodeStateMachine;

/// How long the global-state gate waits for the round to reach the
/// activity a phase message implies (§5's "WaitFor(activity, 250 ms)").
const ACTIVITY_GATE_TIMEOUT: Duration = Duration::from_millis(250);
const ACTIVITY_GATE_POLL: Duration = Duration::from_millis(10);

/// Who is allowed to send a given phase's message, per §4.7 step 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Neighbor {
    /// The previous node in the circuit (sequential phases).
    PrevNode(NodeId),
    /// The last node in the circuit (share-verification, precomp result,
    /// finish-realtime broadcasts).
    LastNode(NodeId),
    /// The external gateway (`PostNewBatch`); not modeled as a
    /// [`NodeId`] since the gateway sits outside the circuit.
    Gateway,
}

fn expected_sender(round: &Round, phase_type: PhaseType) -> Option<Neighbor> {
    let topology = round.topology();
    let node_id = round.node_id();
    let position = topology.iter().position(|&n| n == node_id)?;
    match phase_type {
        PhaseType::RealDecrypt if position == 0 => Some(Neighbor::Gateway),
        _ if position == 0 => topology.last().map(|&n| Neighbor::LastNode(n)),
        _ => topology.get(position - 1).map(|&n| Neighbor::PrevNode(n)),
    }
}

fn activity_for(phase_type: PhaseType) -> RoundState {
    if PhaseType::PRECOMP_SEQUENCE.contains(&phase_type) {
        RoundState::Precomputing
    } else {
        RoundState::Realtime
    }
}

/// Drives the receive-validation sequence and the special messages of
/// §4.7 for every round this node knows about.
///
/// One `Receiver` is shared by a node's entire process: it owns the
/// [`RoundManager`] (the single source of truth for which rounds
/// exist), a [`ResourceQueue`] serializing their phases, and one
/// [`NodeStateMachine`] per round tracking that round's activity.
pub struct Receiver {
    node_id: NodeId,
    rounds: Arc<RoundManager>,
    queue: Arc<ResourceQueue>,
    activity: Mutex<HashMap<RoundId, Arc<NodeStateMachine>>>,
}

impl Receiver {
    /// Builds a receiver around an existing round manager and resource
    /// queue.
    pub fn new(node_id: NodeId, rounds: Arc<RoundManager>, queue: Arc<ResourceQueue>) -> Self {
        Self {
            node_id,
            rounds,
            queue,
            activity: Mutex::new(HashMap::new()),
        }
    }

    /// The node-wide activity tracker for `round_id`, creating one at
    /// `NotStarted` if this is the first message seen for it.
    pub fn activity_for(&self, round_id: RoundId) -> Arc<NodeStateMachine> {
        Arc::clone(
            self.activity
                .lock()
                .entry(round_id)
                .or_insert_with(|| Arc::new(NodeStateMachine::new())),
        )
    }

    fn await_activity(&self, round_id: RoundId, expected: RoundState) -> Result<(), ErrorKind> {
        let activity = self.activity_for(round_id);
        let deadline = std::time::Instant::now() + ACTIVITY_GATE_TIMEOUT;
        while activity.state() != expected {
            if std::time::Instant::now() >= deadline {
                return Err(ErrorKind::StateTimeout { round: round_id });
            }
            std::thread::sleep(ACTIVITY_GATE_POLL);
        }
        Ok(())
    }

    /// Runs the seven-step receive sequence of §4.7 for one incoming
    /// phase message, then queues the phase if it was not already
    /// queued and delivers `slots` into the round.
    ///
    /// # Errors
    /// [`ErrorKind::StateTimeout`] if the round never reaches the
    /// expected activity; [`ErrorKind::AuthError`] if `sender` is not
    /// the phase's expected neighbor; [`ErrorKind::RoundNotFound`] if
    /// `round_id` is unknown; [`ErrorKind::InvalidTypeAssert`] if this
    /// node never built `phase_type`.
    pub fn receive_phase_message(
        &self,
        round_id: RoundId,
        phase_type: PhaseType,
        sender: Neighbor,
        slots: Vec<Slot>,
    ) -> Result<(), ErrorKind> {
        // (1) global-state gate
        self.await_activity(round_id, activity_for(phase_type))?;

        // (3) round lookup, ahead of (2) so we can compute the expected
        // sender from the round's own topology.
        let round = self.rounds.get(round_id)?;

        // (2) authentication
        if expected_sender(&round, phase_type) != Some(sender) {
            return Err(ErrorKind::AuthError {
                round: round_id,
                sender: self.node_id,
            });
        }

        // (4) response lookup
        let (round, phase) = self.rounds.handle_incoming_comm(round_id, phase_type)?;

        // (5) queue if not already queued
        if phase.state() == PhaseState::Initialized {
            self.queue.enqueue(Arc::clone(&phase));
        }

        // (6) decode and deliver
        match phase_type {
            PhaseType::RealDecrypt => round.post_new_batch(slots),
            PhaseType::PrecompShare => {
                if let Some(slot) = slots.into_iter().find(|s| !s.partial_round_public_cypher_key.is_empty()) {
                    if let Ok(value) = round.buffer().group().set_bytes(&slot.partial_round_public_cypher_key) {
                        round.post_share_contribution(value);
                    }
                }
            }
            _ => {}
        }

        // (7) advance phase state happens inside `phase.execute()`, run
        // by the resource queue's worker once it is dequeued.
        Ok(())
    }

    /// `PostRoundPublicKey` (§4.7): the last node's completed
    /// `CypherPublicKey` arrives back at the first node, which enqueues
    /// `PrecompDecrypt` with a synthetic identity batch.
    pub fn post_round_public_key(&self, round_id: RoundId, cypher_public_key: num_bigint::BigUint) -> Result<(), ErrorKind> {
        let round = self.rounds.get(round_id)?;
        *round.buffer().cypher_public_key.lock() = cypher_public_key;
        if let Some(phase) = round.phase(PhaseType::PrecompDecrypt) {
            if phase.state() == PhaseState::Initialized {
                self.queue.enqueue(Arc::clone(phase));
            }
        }
        Ok(())
    }

    /// `PostPrecompResult` (§4.7): the final `(CypherMsg, CypherAD)`
    /// arrives from the last node; the first node transitions to
    /// `Standby` once verified.
    pub fn post_precomp_result(&self, round_id: RoundId) -> Result<(), ErrorKind> {
        let activity = self.activity_for(round_id);
        activity
            .transition(RoundState::Standby)
            .map_err(|_| ErrorKind::StateTimeout { round: round_id })?;
        crate::metrics::record_round_state(RoundState::Standby);
        Ok(())
    }

    /// `PostNewBatch` (§4.7): the gateway hands the first node real
    /// client slots for `RealDecrypt`.
    pub fn post_new_batch(&self, round_id: RoundId, slots: Vec<Slot>) -> Result<(), ErrorKind> {
        let round = self.rounds.get(round_id)?;
        self.activity_for(round_id)
            .transition(RoundState::Realtime)
            .map_err(|_| ErrorKind::StateTimeout { round: round_id })?;
        round.post_new_batch(slots);
        if let Some(phase) = round.phase(PhaseType::RealDecrypt) {
            if phase.state() == PhaseState::Initialized {
                self.queue.enqueue(Arc::clone(phase));
            }
        }
        Ok(())
    }

    /// `FinishRealtime` (§4.7): the last node signals round teardown;
    /// the first node's caller is expected to emit the completed batch
    /// downstream to its gateway.
    pub fn finish_realtime(&self, round_id: RoundId) -> Result<(), ErrorKind> {
        self.activity_for(round_id)
            .transition(RoundState::Completed)
            .map_err(|_| ErrorKind::StateTimeout { round: round_id })?;
        crate::metrics::record_round_state(RoundState::Completed);
        Ok(())
    }

    /// `RoundTripPing` (§4.7): records a single ring traversal's
    /// latency. The payload itself is opaque to this crate.
    pub fn round_trip_ping(&self, round_id: RoundId, round_trip: Duration) {
        tracing::info!(round = %round_id, millis = round_trip.as_millis(), "round-trip ping");
    }

    /// Moves a round to `Error` and persists a record of why, per
    /// §4.8's "Only Error writes a recovered-error record".
    pub fn fail_round(
        &self,
        round_id: RoundId,
        phase: Option<&'static str>,
        err: &ErrorKind,
        error_store: &dyn crate::error_record::ErrorRecordStore,
    ) {
        let _ = self.activity_for(round_id).transition(RoundState::Error);
        crate::metrics::record_round_state(RoundState::Error);
        if let Some(phase) = phase {
            crate::metrics::record_phase_failure(phase);
        }
        let record = crate::error_record::ErrorRecord {
            round_id,
            node_id: self.node_id,
            phase: phase.map(str::to_string),
            message: err.to_string(),
        };
        if let Err(io_err) = error_store.persist(&record) {
            tracing::error!(round = %round_id, error = %io_err, "failed to persist error record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_record::{ErrorRecordStore, InMemoryErrorRecordStore};
    use cmix_group::Group;
    use cmix_types::wire::{NUM_ROUND_STATES, RoundInfo};
    use num_bigint::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn group() -> Arc<Group> {
        Arc::new(Group::new(BigUint::from(107u32), BigUint::from(4u32), BigUint::from(53u32)))
    }

    fn two_node_receiver() -> (Receiver, Arc<RoundManager>) {
        let manager = Arc::new(RoundManager::new());
        let info = RoundInfo {
            round_id: RoundId::new(1),
            update_id: 0,
            state: 0,
            topology: vec![NodeId::new(0), NodeId::new(1)],
            batch_size: 2,
            resource_queue_timeout_millis: 5_000,
            timestamps: [0; NUM_ROUND_STATES],
        };
        let round = Round::new(
            &info,
            NodeId::new(1),
            group(),
            Box::new(ChaCha20Rng::seed_from_u64(9)),
            Arc::new(cmix_round::InMemoryBaseKeyStore::new()),
        );
        manager.add(round);
        let queue = Arc::new(ResourceQueue::start());
        let receiver = Receiver::new(NodeId::new(1), Arc::clone(&manager), queue);
        (receiver, manager)
    }

    #[test]
    fn rejects_message_before_activity_reaches_precomputing() {
        let (receiver, _manager) = two_node_receiver();
        let result = receiver.receive_phase_message(
            RoundId::new(1),
            PhaseType::PrecompGenerate,
            Neighbor::PrevNode(NodeId::new(0)),
            vec![],
        );
        assert!(matches!(result, Err(ErrorKind::StateTimeout { .. })));
    }

    #[test]
    fn rejects_an_unexpected_sender() {
        let (receiver, _manager) = two_node_receiver();
        receiver.activity_for(RoundId::new(1)).transition(RoundState::Waiting).unwrap();
        receiver.activity_for(RoundId::new(1)).transition(RoundState::Precomputing).unwrap();
        let result = receiver.receive_phase_message(
            RoundId::new(1),
            PhaseType::PrecompGenerate,
            Neighbor::PrevNode(NodeId::new(99)),
            vec![],
        );
        assert!(matches!(result, Err(ErrorKind::AuthError { .. })));
    }

    #[test]
    fn accepts_a_validated_message_and_queues_the_phase() {
        let (receiver, manager) = two_node_receiver();
        receiver.activity_for(RoundId::new(1)).transition(RoundState::Waiting).unwrap();
        receiver.activity_for(RoundId::new(1)).transition(RoundState::Precomputing).unwrap();
        receiver
            .receive_phase_message(RoundId::new(1), PhaseType::PrecompGenerate, Neighbor::PrevNode(NodeId::new(0)), vec![])
            .unwrap();
        let round = manager.get(RoundId::new(1)).unwrap();
        let phase = round.phase(PhaseType::PrecompGenerate).unwrap();
        phase.wait_for_state(PhaseState::Verified, Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn misrouted_round_is_not_found() {
        let (receiver, _manager) = two_node_receiver();
        let result = receiver.receive_phase_message(
            RoundId::new(404),
            PhaseType::PrecompGenerate,
            Neighbor::PrevNode(NodeId::new(0)),
            vec![],
        );
        assert!(matches!(result, Err(ErrorKind::RoundNotFound(_))));
    }

    #[test]
    fn fail_round_persists_an_error_record() {
        let (receiver, _manager) = two_node_receiver();
        let store = InMemoryErrorRecordStore::new();
        receiver.fail_round(
            RoundId::new(1),
            Some("PrecompPermute"),
            &ErrorKind::Fatal("resource queue kill timed out".into()),
            &store,
        );
        let record = store.recover().unwrap().unwrap();
        assert_eq!(record.round_id, RoundId::new(1));
        assert_eq!(receiver.activity_for(RoundId::new(1)).state(), RoundState::Error);
    }
}
