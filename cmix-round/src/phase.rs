//! A single phase's runtime state machine, graph execution and timeout.
//!
//! Mirrors the resource queue's execution loop (spec §4.5): a phase moves
//! `Initialized -> Queued -> Active -> Running -> Computed -> Verified`,
//! or to `Failed` if its graph errors or its timeout fires first. State is
//! monotonically non-decreasing, matched by every transition asserting
//! `next >= current`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cmix_types::{ErrorKind, PhaseType, RoundId};
use parking_lot::{Condvar, Mutex};

/// A phase's position in its own lifecycle.
///
/// Declaration order is significant: derived `Ord` makes `Failed` the
/// greatest variant, so a phase that fails from any earlier state still
/// satisfies the monotonically-non-decreasing invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhaseState {
    /// Built, not yet handed to a resource queue.
    Initialized,
    /// Waiting behind another phase in the resource queue's FIFO.
    Queued,
    /// Dequeued; about to start its graph.
    Active,
    /// Graph workers are running.
    Running,
    /// The graph drained every chunk with no error.
    Computed,
    /// `UpdateFinalStates` ran; the phase's output is authoritative.
    Verified,
    /// The graph errored or the phase's timeout fired first.
    Failed,
}

impl PhaseState {
    /// `true` for the two states a phase never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseState::Verified | PhaseState::Failed)
    }
}

/// One phase of a round: a graph run plus the state machine and timeout
/// wrapped around it.
///
/// A `Phase` owns the closure that actually runs its graph (built by
/// [`crate::round::Round`] against that round's buffer) so that the
/// resource queue and round manager never need to know which of the ten
/// phase graphs they are driving.
pub struct Phase {
    phase_type: PhaseType,
    round_id: RoundId,
    timeout: Duration,
    state: Mutex<PhaseState>,
    condvar: Condvar,
    run: Box<dyn Fn(&AtomicBool) -> Result<(), ErrorKind> + Send + Sync>,
    transmit: Option<Box<dyn Fn() + Send + Sync>>,
    killed: Arc<AtomicBool>,
}

impl Phase {
    /// Builds a phase around its graph-running closure. `timeout` is the
    /// round's `resourceQueueTimeoutMillis`. `run` is handed this
    /// phase's cancellation flag so a concurrent [`Self::kill`] can stop
    /// the graph mid-drain.
    pub fn new(
        phase_type: PhaseType,
        round_id: RoundId,
        timeout: Duration,
        run: impl Fn(&AtomicBool) -> Result<(), ErrorKind> + Send + Sync + 'static,
    ) -> Self {
        Self {
            phase_type,
            round_id,
            timeout,
            state: Mutex::new(PhaseState::Initialized),
            condvar: Condvar::new(),
            run: Box::new(run),
            transmit: None,
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attaches the phase's transmission handler (§4.7): run concurrently
    /// with the graph, reading completed chunks and sending them on. The
    /// wire encoding and transport themselves are out of scope for this
    /// crate, so `transmit` is whatever side effect the caller wants to
    /// observe running alongside the graph.
    pub fn with_transmit_handler(mut self, transmit: impl Fn() + Send + Sync + 'static) -> Self {
        self.transmit = Some(Box::new(transmit));
        self
    }

    /// Which of the ten phase graphs this is.
    pub fn phase_type(&self) -> PhaseType {
        self.phase_type
    }

    /// The round this phase belongs to.
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    /// The phase's current lifecycle state.
    pub fn state(&self) -> PhaseState {
        *self.state.lock()
    }

    /// Signals this phase's graph to stop draining as soon as it next
    /// checks its cancellation flag. Used by
    /// [`crate::resource_queue::ResourceQueue::kill`].
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// Moves the phase to `next`, waking anyone blocked in
    /// [`Self::wait_for_state`].
    ///
    /// # Panics
    /// Panics if `next < state()` — a decreasing phase state is the
    /// "fatal bug, abort the node" case spec §4.5 step 5 describes.
    pub fn advance_to(&self, next: PhaseState) {
        let mut state = self.state.lock();
        assert!(
            next >= *state,
            "phase state must be monotonically non-decreasing: {:?} -> {:?}",
            *state,
            next
        );
        *state = next;
        self.condvar.notify_all();
    }

    /// Blocks until this phase reaches at least `target`, or returns
    /// [`ErrorKind::StateTimeout`] after `timeout`.
    ///
    /// Used by [`crate::round_manager::RoundManager::handle_incoming_comm`]
    /// (15 s) and by tests asserting ordering.
    pub fn wait_for_state(&self, target: PhaseState, timeout: Duration) -> Result<(), ErrorKind> {
        let mut state = self.state.lock();
        let deadline = Instant::now() + timeout;
        while *state < target {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ErrorKind::StateTimeout { round: self.round_id });
            }
            let timed_out = self.condvar.wait_for(&mut state, remaining).timed_out();
            if timed_out && *state < target {
                return Err(ErrorKind::StateTimeout { round: self.round_id });
            }
        }
        Ok(())
    }

    /// Runs this phase's graph to completion.
    ///
    /// Marks the phase `Active` then `Running`, launches the transmission
    /// handler (if any) on its own thread, and runs the graph closure on
    /// another. Whichever finishes, the phase settles at `Verified` on
    /// success or `Failed` on error or timeout — matching the resource
    /// queue's `select{ finish, timeout, kill }` (§4.5 step 5, §5).
    pub fn execute(self: &Arc<Self>) -> Result<(), ErrorKind> {
        self.advance_to(PhaseState::Active);
        self.advance_to(PhaseState::Running);

        let transmit_handle = self.transmit.is_some().then(|| {
            let phase = Arc::clone(self);
            std::thread::spawn(move || {
                (phase.transmit.as_ref().expect("checked by is_some above"))();
            })
        });

        let (tx, rx) = std::sync::mpsc::channel();
        let graph_phase = Arc::clone(self);
        std::thread::spawn(move || {
            let result = (graph_phase.run)(&graph_phase.killed);
            let _ = tx.send(result);
        });

        let result = match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::PhaseTimeout {
                round: self.round_id,
                phase: self.phase_type.as_str(),
            }),
        };

        if let Some(handle) = transmit_handle {
            let _ = handle.join();
        }

        match &result {
            Ok(()) => {
                self.advance_to(PhaseState::Computed);
                self.advance_to(PhaseState::Verified);
            }
            Err(_) => self.advance_to(PhaseState::Failed),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(
        timeout: Duration,
        run: impl Fn(&AtomicBool) -> Result<(), ErrorKind> + Send + Sync + 'static,
    ) -> Arc<Phase> {
        Arc::new(Phase::new(PhaseType::PrecompGenerate, RoundId::new(1), timeout, run))
    }

    #[test]
    fn successful_run_reaches_verified() {
        let p = phase(Duration::from_secs(1), |_| Ok(()));
        assert!(p.execute().is_ok());
        assert_eq!(p.state(), PhaseState::Verified);
    }

    #[test]
    fn failing_run_reaches_failed() {
        let p = phase(Duration::from_secs(1), |_| {
            Err(ErrorKind::OutsideOfGroup { index: 0 })
        });
        assert!(p.execute().is_err());
        assert_eq!(p.state(), PhaseState::Failed);
    }

    #[test]
    fn graph_that_never_returns_times_out_as_failed() {
        let p = phase(Duration::from_millis(20), |_| {
            std::thread::sleep(Duration::from_secs(5));
            Ok(())
        });
        let result = p.execute();
        assert!(matches!(result, Err(ErrorKind::PhaseTimeout { .. })));
        assert_eq!(p.state(), PhaseState::Failed);
    }

    #[test]
    fn killed_graph_observes_cancellation() {
        let p = phase(Duration::from_secs(5), |cancel| {
            while !cancel.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(ErrorKind::Fatal("phase cancelled by resource queue".into()))
        });
        let killer = Arc::clone(&p);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            killer.kill();
        });
        let result = p.execute();
        handle.join().unwrap();
        assert!(result.is_err());
        assert_eq!(p.state(), PhaseState::Failed);
    }

    #[test]
    fn decreasing_state_panics() {
        let p = phase(Duration::from_secs(1), |_| Ok(()));
        p.advance_to(PhaseState::Verified);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            p.advance_to(PhaseState::Active);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn wait_for_state_wakes_on_advance() {
        let p = phase(Duration::from_secs(1), |_| Ok(()));
        let waiter = Arc::clone(&p);
        let handle = std::thread::spawn(move || waiter.wait_for_state(PhaseState::Running, Duration::from_secs(1)));
        std::thread::sleep(Duration::from_millis(10));
        p.advance_to(PhaseState::Active);
        p.advance_to(PhaseState::Running);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn wait_for_state_times_out() {
        let p = phase(Duration::from_secs(1), |_| Ok(()));
        let result = p.wait_for_state(PhaseState::Running, Duration::from_millis(20));
        assert!(matches!(result, Err(ErrorKind::StateTimeout { .. })));
    }
}
