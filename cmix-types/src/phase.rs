//! The phase-type and round-state enums that tag lifecycle transitions
//! and every inter-node message.

use serde::{Deserialize, Serialize};

/// The ten graphs a round runs, in declared order.
///
/// `PrecompStrip` and `RealIdentify` are only ever built on the last
/// node of a circuit; the graph builder omits them elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseType {
    /// Fills exponent buffers and contributes this node's `g^Z`.
    PrecompGenerate,
    /// Combines every node's contribution into `CypherPublicKey`.
    PrecompShare,
    /// ElGamal-encrypts the message and associated-data key streams.
    PrecompDecrypt,
    /// Applies ElGamal with the permuted keys, then permutes.
    PrecompPermute,
    /// Removes one layer of homomorphic encryption via `RootCoprime`.
    PrecompReveal,
    /// Last-node only: inverts and multiplies to reveal precomputations.
    PrecompStrip,
    /// Keys in per-client material and multiplies it into the payload.
    RealDecrypt,
    /// Multiplies in internode keys, then permutes.
    RealPermute,
    /// Last-node only: strips the associated-data track to reveal recipients.
    RealIdentify,
    /// Final multiply that clears the remaining key, yielding plaintext.
    RealEncrypt,
}

impl PhaseType {
    /// All phases run during precomputation, in order.
    pub const PRECOMP_SEQUENCE: [PhaseType; 6] = [
        PhaseType::PrecompGenerate,
        PhaseType::PrecompShare,
        PhaseType::PrecompDecrypt,
        PhaseType::PrecompPermute,
        PhaseType::PrecompReveal,
        PhaseType::PrecompStrip,
    ];

    /// All phases run during realtime, in order.
    pub const REALTIME_SEQUENCE: [PhaseType; 4] = [
        PhaseType::RealDecrypt,
        PhaseType::RealPermute,
        PhaseType::RealIdentify,
        PhaseType::RealEncrypt,
    ];

    /// `true` for the phases that only exist on the last node of a
    /// circuit: `PrecompStrip` resolves the round's precomputations, and
    /// `RealIdentify`/`RealEncrypt` consume them to reveal the recipient
    /// and the plaintext. Every other node forwards after `RealPermute`.
    pub fn is_last_node_only(self) -> bool {
        matches!(
            self,
            PhaseType::PrecompStrip | PhaseType::RealIdentify | PhaseType::RealEncrypt
        )
    }

    /// A short, stable name used in logs and message tags.
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseType::PrecompGenerate => "PrecompGenerate",
            PhaseType::PrecompShare => "PrecompShare",
            PhaseType::PrecompDecrypt => "PrecompDecrypt",
            PhaseType::PrecompPermute => "PrecompPermute",
            PhaseType::PrecompReveal => "PrecompReveal",
            PhaseType::PrecompStrip => "PrecompStrip",
            PhaseType::RealDecrypt => "RealDecrypt",
            PhaseType::RealPermute => "RealPermute",
            PhaseType::RealIdentify => "RealIdentify",
            PhaseType::RealEncrypt => "RealEncrypt",
        }
    }
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The node-level round lifecycle (see `§4.8` of the design).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundState {
    /// No round-info has been received for this slot yet.
    NotStarted,
    /// A round-info has been dequeued but phases are not yet built.
    Waiting,
    /// Precomputation phases are active.
    Precomputing,
    /// Precomputation finished; waiting for the realtime batch.
    Standby,
    /// Realtime phases are active.
    Realtime,
    /// `FinishRealtime` was processed; round is being torn down.
    Completed,
    /// A phase or transport error occurred; round failed.
    Error,
    /// An `Error` round could not be recovered within its grace period.
    Crash,
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoundState::NotStarted => "NotStarted",
            RoundState::Waiting => "Waiting",
            RoundState::Precomputing => "Precomputing",
            RoundState::Standby => "Standby",
            RoundState::Realtime => "Realtime",
            RoundState::Completed => "Completed",
            RoundState::Error => "Error",
            RoundState::Crash => "Crash",
        };
        f.write_str(s)
    }
}
