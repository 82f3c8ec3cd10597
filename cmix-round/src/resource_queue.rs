//! Serializes phase execution on one node: at most one phase's graph
//! runs at a time, in FIFO enqueue order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::phase::{Phase, PhaseState};

/// Errors specific to the resource queue's own lifecycle (as opposed to
/// the [`cmix_types::ErrorKind`] a phase's graph can fail with).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceQueueError {
    /// `kill` was called but the active phase's workers did not yield
    /// within the given grace period.
    #[error("resource queue did not shut down within {0:?}")]
    ShutdownTimedOut(Duration),
}

struct Shared {
    pending: Mutex<VecDeque<Arc<Phase>>>,
    not_empty: Condvar,
    stopping: AtomicBool,
    active: Mutex<Option<Arc<Phase>>>,
}

/// A single-worker FIFO in front of the phase graphs a round runs.
///
/// Mirrors spec §4.5's loop: dequeue, mark active, run the phase (which
/// itself launches the transmission handler and enforces the phase
/// timeout, per [`Phase::execute`]), then repeat. `kill` cancels
/// whichever phase is running and discards everything still queued.
pub struct ResourceQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceQueue {
    /// Starts the queue's worker thread. It idles until phases are
    /// enqueued.
    pub fn start() -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            stopping: AtomicBool::new(false),
            active: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("resource-queue".to_string())
            .spawn(move || Self::run(worker_shared))
            .expect("failed to spawn resource queue worker thread");

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let phase = {
                let mut pending = shared.pending.lock();
                loop {
                    if shared.stopping.load(Ordering::Acquire) {
                        return;
                    }
                    if let Some(phase) = pending.pop_front() {
                        break phase;
                    }
                    shared.not_empty.wait_for(&mut pending, Duration::from_millis(100));
                }
            };

            *shared.active.lock() = Some(Arc::clone(&phase));
            // `Phase::execute` carries the Active/Running/Computed or
            // Failed transitions and the per-phase timeout; a graph
            // error here is a round-level concern the caller observes
            // through `phase.state()`, not something the queue retries.
            let _ = phase.execute();
            *shared.active.lock() = None;
        }
    }

    /// Queues `phase` for execution. Succeeds even if another phase is
    /// currently running; `phase` runs once every phase ahead of it in
    /// the FIFO has signalled finished.
    pub fn enqueue(&self, phase: Arc<Phase>) {
        phase.advance_to(PhaseState::Queued);
        self.shared.pending.lock().push_back(phase);
        self.shared.not_empty.notify_one();
    }

    /// `true` iff some phase is currently `Active`/`Running` on this
    /// queue's worker.
    pub fn is_running(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Cancels the active phase and drops every phase still pending.
    /// Blocks up to `timeout` for the worker thread to observe the
    /// cancellation and go idle.
    ///
    /// # Errors
    /// Returns [`ResourceQueueError::ShutdownTimedOut`] if the worker
    /// has not yielded within `timeout` — the node-level state machine
    /// treats this as [`cmix_types::ErrorKind::Fatal`] (§5: "5s grace;
    /// afterward the node transitions to Error").
    pub fn kill(&self, timeout: Duration) -> Result<(), ResourceQueueError> {
        self.shared.pending.lock().clear();
        if let Some(active) = self.shared.active.lock().as_ref() {
            active.kill();
        }
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.not_empty.notify_one();

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.shared.active.lock().is_none() && self.worker.lock().as_ref().is_none_or(JoinHandle::is_finished) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) if handle.is_finished() => {
                let _ = handle.join();
                Ok(())
            }
            Some(handle) => {
                *self.worker.lock() = Some(handle);
                Err(ResourceQueueError::ShutdownTimedOut(timeout))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmix_types::{ErrorKind, PhaseType, RoundId};
    use std::sync::Mutex as StdMutex;

    fn phase(
        phase_type: PhaseType,
        run: impl Fn(&AtomicBool) -> Result<(), ErrorKind> + Send + Sync + 'static,
    ) -> Arc<Phase> {
        Arc::new(Phase::new(phase_type, RoundId::new(1), Duration::from_secs(5), run))
    }

    #[test]
    fn phases_activate_strictly_in_enqueue_order() {
        let queue = ResourceQueue::start();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let make = |name: &'static str, order: Arc<StdMutex<Vec<&'static str>>>| {
            phase(PhaseType::PrecompGenerate, move |_| {
                order.lock().unwrap().push(name);
                std::thread::sleep(Duration::from_millis(20));
                Ok(())
            })
        };

        let a = make("A", Arc::clone(&order));
        let b = make("B", Arc::clone(&order));
        let c = make("C", Arc::clone(&order));
        queue.enqueue(Arc::clone(&a));
        queue.enqueue(Arc::clone(&b));
        queue.enqueue(Arc::clone(&c));

        c.wait_for_state(PhaseState::Verified, Duration::from_secs(2)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
        queue.kill(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn kill_cancels_the_active_phase_within_its_grace_period() {
        let queue = ResourceQueue::start();
        let p = phase(PhaseType::PrecompGenerate, |cancel| {
            while !cancel.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(ErrorKind::Fatal("phase cancelled by resource queue".into()))
        });
        queue.enqueue(Arc::clone(&p));
        p.wait_for_state(PhaseState::Running, Duration::from_secs(1)).unwrap();
        assert!(queue.kill(Duration::from_secs(5)).is_ok());
        assert_eq!(p.state(), PhaseState::Failed);
    }
}
