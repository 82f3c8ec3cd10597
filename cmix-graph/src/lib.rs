#![deny(missing_docs)]
//! A generic, chunked, multi-threaded dataflow graph engine.
//!
//! A [`Graph`] wires a sequence of [`Module`]s around a shared, per-graph
//! [`Stream`] into a linear pipeline. External producers feed [`Chunk`]s
//! (half-open slot ranges) into the first module; each module subdivides
//! incoming chunks to its own preferred width, calls its adapter function
//! once per sub-chunk, and forwards the (unchanged) chunk boundaries
//! downstream once its adapter has mutated the shared stream in place.
//!
//! This crate knows nothing about cMix, cryptography, or rounds — it is
//! the same kind of worker-pool-over-bounded-channels engine used to run
//! any staged, parallel pipeline. `cmix-round` supplies the concrete
//! streams and modules.

mod chunk;
mod error;
mod graph;
mod module;
mod stream;

pub use chunk::Chunk;
pub use error::GraphError;
pub use graph::{Graph, GraphBuilder, GraphHandle};
pub use module::{InputSize, Module, NumThreads};
pub use stream::Stream;
