//! The error taxonomy shared by every crate in this workspace.

use crate::RoundId;

/// Every error kind a cMix node can produce, from slot-level validation
/// up to fatal, process-ending conditions.
///
/// Propagation policy: input-validation errors (`OutsideOfBatch` through
/// `KmacMismatch`) are local to one slot — the slot is reported to the
/// round's client-failure collector and the phase continues.
/// `InvalidTypeAssert`, `StateTimeout` and `PhaseTimeout` move the whole
/// round to `Error`. `Fatal` terminates the process after best-effort
/// persistence of an error record.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    /// A slot index fell outside `[0, batchSize)`.
    #[error("slot {index} is outside of batch size {batch_size}")]
    OutsideOfBatch {
        /// The offending slot index.
        index: u32,
        /// The round's declared batch size.
        batch_size: u32,
    },
    /// A slot's bytes did not decode to a group element `< p`.
    #[error("slot {index} is not inside the group")]
    OutsideOfGroup {
        /// The offending slot index.
        index: u32,
    },
    /// A salt field was not exactly 32 bytes.
    #[error("salt for slot {index} has incorrect length {len}")]
    SaltIncorrectLength {
        /// The offending slot index.
        index: u32,
        /// The length actually supplied.
        len: usize,
    },
    /// A user id field was shorter than the canonical id length.
    #[error("user id for slot {index} is too short")]
    UserIdTooShort {
        /// The offending slot index.
        index: u32,
    },
    /// A client's KMAC witness did not match the node's recomputation.
    #[error("kmac mismatch for slot {index}")]
    KmacMismatch {
        /// The offending slot index.
        index: u32,
    },
    /// Internal wiring bug: a module's stream or cryptop did not match
    /// the type it expected. Fatal for the phase.
    #[error("invalid type assertion in phase {phase} of {round}")]
    InvalidTypeAssert {
        /// The round this happened in.
        round: RoundId,
        /// The phase this happened in.
        phase: &'static str,
    },
    /// A receiver waited longer than 15s for the expected phase state.
    #[error("timed out waiting for phase state in {round}")]
    StateTimeout {
        /// The round this happened in.
        round: RoundId,
    },
    /// The sender of a message was not the expected neighbor for the
    /// phase. The message is dropped.
    #[error("unexpected sender {sender} for {round}")]
    AuthError {
        /// The round this happened in.
        round: RoundId,
        /// The unexpected sender.
        sender: crate::NodeId,
    },
    /// A round id was not present in the round manager.
    #[error("round {0} not found")]
    RoundNotFound(RoundId),
    /// The resource queue's timer fired before the graph drained.
    #[error("phase {phase} of {round} timed out")]
    PhaseTimeout {
        /// The round this happened in.
        round: RoundId,
        /// The phase that timed out.
        phase: &'static str,
    },
    /// An inter-node send failed (after one retry).
    #[error("transport error sending {phase} of {round}")]
    TransportError {
        /// The round this happened in.
        round: RoundId,
        /// The phase being transmitted.
        phase: &'static str,
    },
    /// Unrecoverable: resource queue kill timed out, or the node
    /// restarted from a persisted error record. Terminates the process.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl ErrorKind {
    /// `true` iff this error is local to one slot and does not require
    /// moving the round to `Error`.
    pub fn is_slot_local(&self) -> bool {
        matches!(
            self,
            ErrorKind::OutsideOfBatch { .. }
                | ErrorKind::OutsideOfGroup { .. }
                | ErrorKind::SaltIncorrectLength { .. }
                | ErrorKind::UserIdTooShort { .. }
                | ErrorKind::KmacMismatch { .. }
        )
    }

    /// `true` iff this error should move the round to `Error`.
    pub fn is_round_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidTypeAssert { .. }
                | ErrorKind::StateTimeout { .. }
                | ErrorKind::PhaseTimeout { .. }
                | ErrorKind::TransportError { .. }
        )
    }
}
