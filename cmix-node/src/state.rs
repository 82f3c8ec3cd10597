//! The node-wide round lifecycle (spec §4.8): `NotStarted -> Waiting ->
//! Precomputing -> Standby -> Realtime -> Completed`, with `Error` and
//! `Crash` reachable from anywhere the pipeline can fail.

use cmix_types::RoundState;
use parking_lot::Mutex;

/// `true` iff a node may move directly from `from` to `to`.
///
/// Mirrors the activity-level transitions of §4.8: external
/// orchestration can request `Precomputing` or `Realtime`; internal
/// completion events move `Standby`/`Completed`; any active state can
/// fail to `Error`, and a killed resource queue moves `Error` to
/// `Crash`.
fn is_allowed(from: RoundState, to: RoundState) -> bool {
    use RoundState::*;
    match (from, to) {
        (NotStarted, Waiting) => true,
        (Waiting, Precomputing) => true,
        (Precomputing, Standby) => true,
        (Standby, Realtime) => true,
        (Realtime, Completed) => true,
        (Error, Crash) => true,
        (from, Error) => !matches!(from, Completed | Crash),
        _ => false,
    }
}

/// One round slot's current activity, guarded so that transitions are
/// validated and observable together.
///
/// A node runs many rounds concurrently, each with its own
/// `NodeStateMachine`; this type does not itself look anything up in
/// [`cmix_round::RoundManager`] — callers own the association between a
/// [`cmix_types::RoundId`] and its state machine.
pub struct NodeStateMachine {
    state: Mutex<RoundState>,
}

impl NodeStateMachine {
    /// A fresh state machine starting at `NotStarted`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RoundState::NotStarted),
        }
    }

    /// The current activity.
    pub fn state(&self) -> RoundState {
        *self.state.lock()
    }

    /// Attempts the transition to `to`.
    ///
    /// # Errors
    /// Returns the rejected `(from, to)` pair if `to` is not reachable
    /// from the current state, leaving the state unchanged.
    pub fn transition(&self, to: RoundState) -> Result<(), (RoundState, RoundState)> {
        let mut state = self.state.lock();
        if is_allowed(*state, to) {
            tracing::info!(from = %*state, to = %to, "round activity transition");
            *state = to;
            Ok(())
        } else {
            Err((*state, to))
        }
    }
}

impl Default for NodeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RoundState::*;

    #[test]
    fn follows_the_happy_path() {
        let m = NodeStateMachine::new();
        for next in [Waiting, Precomputing, Standby, Realtime, Completed] {
            m.transition(next).unwrap();
        }
        assert_eq!(m.state(), Completed);
    }

    #[test]
    fn any_active_state_can_fail() {
        let m = NodeStateMachine::new();
        m.transition(Waiting).unwrap();
        m.transition(Precomputing).unwrap();
        m.transition(Error).unwrap();
        assert_eq!(m.state(), Error);
    }

    #[test]
    fn error_can_escalate_to_crash() {
        let m = NodeStateMachine::new();
        m.transition(Waiting).unwrap();
        m.transition(Error).unwrap();
        m.transition(Crash).unwrap();
        assert_eq!(m.state(), Crash);
    }

    #[test]
    fn completed_and_crash_are_terminal() {
        let m = NodeStateMachine::new();
        for next in [Waiting, Precomputing, Standby, Realtime, Completed] {
            m.transition(next).unwrap();
        }
        assert_eq!(m.transition(Error), Err((Completed, Error)));
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        let m = NodeStateMachine::new();
        assert_eq!(m.transition(Precomputing), Err((NotStarted, Precomputing)));
    }
}
