//! Module templates: one node in a [`crate::Graph`].

use std::sync::Arc;

use crate::{Chunk, GraphError, Stream};

/// The chunk width a module prefers for its adapter calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSize {
    /// Accept whatever chunk the previous stage produced, unsplit.
    Auto,
    /// Subdivide incoming chunks to exactly this many slots.
    Fixed(u32),
}

/// How many workers should pull chunks off this module's input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumThreads {
    /// `max(1, available_parallelism())`.
    Auto,
    /// Exactly this many worker threads.
    Fixed(usize),
}

impl NumThreads {
    pub(crate) fn resolve(self) -> usize {
        match self {
            NumThreads::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .max(1),
            NumThreads::Fixed(n) => n.max(1),
        }
    }
}

/// One node in a graph: applies a cryptop to a chunk using the graph's
/// stream as state.
///
/// `Module` is an immutable template; a [`crate::Graph`] clones it when
/// built, mirroring the upstream "deep copy per graph instance"
/// contract (there is no per-instance mutable state to copy here, so a
/// cheap `Arc` clone of the adapter closure suffices).
pub struct Module<S: Stream> {
    name: &'static str,
    input_size: InputSize,
    num_threads: NumThreads,
    adapt: Arc<dyn Fn(&S, Chunk) -> Result<(), GraphError> + Send + Sync>,
}

// Hand-written rather than `#[derive(Clone)]`: a derive would add a spurious
// `S: Clone` bound (none of the fields actually need it — `adapt` clones via
// `Arc`), which would make `.clone()` on a generic `&Module<S>` silently
// resolve to cloning the reference itself instead of this impl.
impl<S: Stream> Clone for Module<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            input_size: self.input_size,
            num_threads: self.num_threads,
            adapt: Arc::clone(&self.adapt),
        }
    }
}

impl<S: Stream> Module<S> {
    /// Builds a new module from its adapter function.
    pub fn new(
        name: &'static str,
        input_size: InputSize,
        num_threads: NumThreads,
        adapt: impl Fn(&S, Chunk) -> Result<(), GraphError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            input_size,
            num_threads,
            adapt: Arc::new(adapt),
        }
    }

    /// The module's name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The module's preferred chunk width.
    pub fn input_size(&self) -> InputSize {
        self.input_size
    }

    /// How many worker threads this module runs.
    pub fn num_threads(&self) -> NumThreads {
        self.num_threads
    }

    pub(crate) fn run_adapt(&self, stream: &S, chunk: Chunk) -> Result<(), GraphError> {
        (self.adapt)(stream, chunk)
    }
}
