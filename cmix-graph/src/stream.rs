//! The per-graph shared state that modules read from and write to.

/// A graph-scoped aggregate of buffers and scratch space.
///
/// Implementors bind their fields to round buffers in a `Link` method of
/// their own (the concrete signature varies per phase graph, so it is not
/// part of this trait) and expose `Input`/`Output` for external slot
/// ingestion/materialization. The only thing the engine itself needs is a
/// name, for logging.
pub trait Stream: Send + Sync {
    /// A short, human-readable name for this stream, used in logs and
    /// error messages.
    fn get_name(&self) -> &'static str;
}
