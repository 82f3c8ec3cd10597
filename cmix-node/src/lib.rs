#![deny(missing_docs)]
//! Node-level orchestration around the per-round core in [`cmix_round`].
//!
//! [`cmix_round`] knows how to build and run the ten phase graphs of a
//! single round. This crate is the layer above it: the node-wide
//! [`state::NodeStateMachine`] (spec §4.8), the inter-node
//! [`receiver::Receiver`] validation sequence and special messages
//! (§4.7), and the [`error_record`] persisted on a fatal round.
//!
//! Out of scope here, same as for `cmix-round`: the wire codec, the
//! gateway/permissioning handshake, and the durable backend behind a
//! client user registry. [`config::NodeConfig`] is the neutral data this
//! crate needs from configuration; loading it from YAML/CLI is
//! `cmix-node-cli`'s job.

pub mod config;
pub mod error_record;
pub mod metrics;
pub mod receiver;
pub mod state;

pub use error_record::{ErrorRecord, ErrorRecordStore, FileErrorRecordStore, InMemoryErrorRecordStore};
pub use receiver::{Neighbor, Receiver};
pub use state::NodeStateMachine;
