#![deny(missing_docs)]
//! The per-round cryptographic core of a cMix mix-network server node.
//!
//! A [`Round`] owns one [`round_buffer::RoundBuffer`] and drives it through
//! the ten [`cmix_types::PhaseType`] graphs built in [`graphs`], in the
//! order [`cmix_types::PhaseType::PRECOMP_SEQUENCE`] followed by
//! [`cmix_types::PhaseType::REALTIME_SEQUENCE`]. [`RoundManager`] owns every
//! round a node currently has state for, and [`ResourceQueue`] serializes
//! phase execution across rounds so that only one phase ever touches the
//! CPU-bound graph engine at a time.
//!
//! Out of scope for this crate: the wire codec used to transmit batches
//! between nodes, the gateway/permissioning handshake that hands a node its
//! [`cmix_types::wire::RoundInfo`], and the durable backend behind
//! [`base_key_store::BaseKeyStore`]. Those are `cmix-node`'s job.

mod base_key_store;
mod graphs;
mod phase;
mod resource_queue;
mod round;
mod round_buffer;
mod round_manager;
pub mod streams;

pub use base_key_store::{BaseKeyStore, InMemoryBaseKeyStore};
pub use phase::{Phase, PhaseState};
pub use resource_queue::{ResourceQueue, ResourceQueueError};
pub use round::Round;
pub use round_buffer::{LastNodeBuffers, RoundBuffer};
pub use round_manager::RoundManager;
