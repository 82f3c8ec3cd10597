//! One [`cmix_graph::Stream`] implementation per phase graph.
//!
//! Each module here owns the glue between a phase's cryptops and the
//! shared [`crate::round_buffer::RoundBuffer`]; [`crate::graphs`] wires
//! these streams into runnable graphs.

pub mod decrypt;
pub mod generate;
pub mod permute;
pub mod real_decrypt;
pub mod real_encrypt;
pub mod real_identify;
pub mod real_permute;
pub mod reveal;
pub mod share;
pub mod strip;
