//! Owns every round this node currently has state for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cmix_types::{ErrorKind, PhaseType, RoundId};
use parking_lot::Mutex;

use crate::phase::PhaseState;
use crate::round::Round;

/// How long [`RoundManager::handle_incoming_comm`] waits for a phase to
/// reach the state a neighbor's message implies, before giving up.
const INCOMING_COMM_TIMEOUT: Duration = Duration::from_secs(15);

/// A node's table of in-flight rounds, keyed by [`RoundId`].
///
/// One node runs many rounds concurrently (a round's precomputation can
/// overlap another round's realtime phase), so this is the thing a
/// node-level dispatcher consults before touching a specific round's
/// phases.
pub struct RoundManager {
    rounds: Mutex<HashMap<RoundId, Arc<Round>>>,
}

impl RoundManager {
    /// An empty round table.
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `round`, replacing any previous round with the same id.
    pub fn add(&self, round: Round) -> Arc<Round> {
        let round = Arc::new(round);
        self.rounds.lock().insert(round.id(), Arc::clone(&round));
        round
    }

    /// Looks up a round by id.
    ///
    /// # Errors
    /// Returns [`ErrorKind::RoundNotFound`] if no round with that id is
    /// registered (e.g. a message addressed to a round this node already
    /// deleted, per §4.7's receive-validation step 1).
    pub fn get(&self, id: RoundId) -> Result<Arc<Round>, ErrorKind> {
        self.rounds.lock().get(&id).cloned().ok_or(ErrorKind::RoundNotFound(id))
    }

    /// Removes a round and zeroizes its buffer (§4.6's `Delete`).
    ///
    /// # Errors
    /// Returns [`ErrorKind::RoundNotFound`] if no round with that id is
    /// registered.
    pub fn delete(&self, id: RoundId) -> Result<(), ErrorKind> {
        let round = self.rounds.lock().remove(&id).ok_or(ErrorKind::RoundNotFound(id))?;
        round.erase();
        Ok(())
    }

    /// Looks up `round_id`'s `phase_type` phase and waits up to 15s for
    /// it to reach `Queued` — the state a neighbor's incoming message for
    /// that phase implies this node should already be in, per §4.7's
    /// receive-validation sequence.
    ///
    /// # Errors
    /// [`ErrorKind::RoundNotFound`] if the round is unknown,
    /// [`ErrorKind::InvalidTypeAssert`] if this node never built that
    /// phase (e.g. a non-last node receiving a `RealIdentify` message),
    /// or [`ErrorKind::StateTimeout`] if it never reaches `Queued` in
    /// time.
    pub fn handle_incoming_comm(
        &self,
        round_id: RoundId,
        phase_type: PhaseType,
    ) -> Result<(Arc<Round>, Arc<crate::phase::Phase>), ErrorKind> {
        let round = self.get(round_id)?;
        let phase = round.phase(phase_type).cloned().ok_or(ErrorKind::InvalidTypeAssert {
            round: round_id,
            phase: phase_type.as_str(),
        })?;
        phase.wait_for_state(PhaseState::Queued, INCOMING_COMM_TIMEOUT)?;
        Ok((round, phase))
    }

    /// Every round id currently registered.
    pub fn round_ids(&self) -> Vec<RoundId> {
        self.rounds.lock().keys().copied().collect()
    }
}

impl Default for RoundManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmix_group::Group;
    use cmix_types::wire::{NUM_ROUND_STATES, RoundInfo};
    use cmix_types::NodeId;
    use num_bigint::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn group() -> Arc<Group> {
        Arc::new(Group::new(BigUint::from(107u32), BigUint::from(4u32), BigUint::from(53u32)))
    }

    fn info(round_id: u64) -> RoundInfo {
        RoundInfo {
            round_id: RoundId::new(round_id),
            update_id: 0,
            state: 0,
            topology: vec![NodeId::new(0)],
            batch_size: 2,
            resource_queue_timeout_millis: 5_000,
            timestamps: [0; NUM_ROUND_STATES],
        }
    }

    fn round(round_id: u64) -> Round {
        Round::new(
            &info(round_id),
            NodeId::new(0),
            group(),
            Box::new(ChaCha20Rng::seed_from_u64(round_id)),
            Arc::new(crate::base_key_store::InMemoryBaseKeyStore::new()),
        )
    }

    #[test]
    fn unknown_round_is_not_found() {
        let manager = RoundManager::new();
        assert!(matches!(manager.get(RoundId::new(1)), Err(ErrorKind::RoundNotFound(_))));
    }

    #[test]
    fn add_then_get_returns_the_same_round() {
        let manager = RoundManager::new();
        let added = manager.add(round(1));
        let fetched = manager.get(RoundId::new(1)).unwrap();
        assert_eq!(added.id(), fetched.id());
    }

    #[test]
    fn delete_removes_and_erases() {
        let manager = RoundManager::new();
        manager.add(round(1));
        manager.delete(RoundId::new(1)).unwrap();
        assert!(matches!(manager.get(RoundId::new(1)), Err(ErrorKind::RoundNotFound(_))));
    }

    #[test]
    fn delete_missing_round_is_not_found() {
        let manager = RoundManager::new();
        assert!(matches!(manager.delete(RoundId::new(99)), Err(ErrorKind::RoundNotFound(_))));
    }

    #[test]
    fn handle_incoming_comm_rejects_a_phase_this_node_never_built() {
        let manager = RoundManager::new();
        manager.add(round(1));
        let result = manager.handle_incoming_comm(RoundId::new(1), PhaseType::RealIdentify);
        assert!(matches!(result, Err(ErrorKind::InvalidTypeAssert { .. })));
    }

    #[test]
    fn handle_incoming_comm_finds_a_queued_phase() {
        let manager = RoundManager::new();
        let added = manager.add(round(1));
        added.phase(PhaseType::PrecompGenerate).unwrap().advance_to(PhaseState::Queued);
        let (found_round, phase) = manager
            .handle_incoming_comm(RoundId::new(1), PhaseType::PrecompGenerate)
            .unwrap();
        assert_eq!(found_round.id(), RoundId::new(1));
        assert_eq!(phase.state(), PhaseState::Queued);
    }
}
