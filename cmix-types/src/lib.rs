#![deny(missing_docs)]
//! Neutral wire types and the shared error taxonomy for a cMix node.
//!
//! This crate groups together the strongly-typed values and message
//! structures used across a cMix server node. It provides:
//!
//! * Thin wrappers around primitive identifiers (round ids, node ids)
//!   with consistent serialization and display implementations.
//! * The neutral [`wire::Slot`], [`wire::RoundInfo`] and [`wire::Batch`]
//!   structures the core exposes at its network boundary.
//! * [`PhaseType`] and [`RoundState`], the enums that tag every
//!   inter-node message and every round lifecycle transition.
//! * [`ErrorKind`], the single error taxonomy shared by every other
//!   crate in this workspace.
//!
//! The wire encoding itself (how a [`wire::Slot`] is serialized onto the
//! network) is out of scope for this crate and for the core as a
//! whole; callers are expected to bring their own codec.

mod error;
mod ids;
mod phase;
pub mod wire;

pub use error::ErrorKind;
pub use ids::{NodeId, RoundId};
pub use phase::{PhaseType, RoundState};
