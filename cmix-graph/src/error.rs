//! Errors the graph engine and its modules can raise.

/// Errors raised while building or running a [`crate::Graph`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    /// A module's adapter received a stream it could not downcast to the
    /// type it expected, or a cryptop that did not match the module's
    /// prototype.
    #[error("invalid type assertion inside module adapter")]
    InvalidTypeAssert,
    /// An input slot index fell outside `[0, batchSize)`.
    #[error("slot index outside of batch")]
    OutsideOfBatch,
    /// A slot's bytes did not decode to a group element.
    #[error("slot bytes outside of group")]
    OutsideOfGroup,
    /// A module adapter returned an application-level error.
    #[error("module '{module}' failed: {source}")]
    Adapter {
        /// Name of the failing module.
        module: &'static str,
        /// Underlying error.
        #[source]
        source: std::sync::Arc<dyn std::error::Error + Send + Sync>,
    },
    /// The graph was killed (cancelled) before it drained.
    #[error("graph was killed before completion")]
    Killed,
}
