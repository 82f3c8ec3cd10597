//! `PrecompShare`: folds this node's `g^z` contribution into the
//! team's running `CypherPublicKey` product.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};

use crate::round_buffer::RoundBuffer;

/// `PrecompShare`'s stream: a single running value, not per-slot data.
pub struct ShareStream {
    buf: Arc<RoundBuffer>,
    /// The partial product received from the previous node in the
    /// circuit, or `1` on the first node.
    incoming: num_bigint::BigUint,
}

impl ShareStream {
    /// Builds a share stream that will fold `incoming` (the upstream
    /// node's partial cypher key, or `1` on the first node) with this
    /// node's own `g^z`.
    pub fn new(buf: Arc<RoundBuffer>, incoming: num_bigint::BigUint) -> Self {
        Self { buf, incoming }
    }

    /// Computes `CypherPublicKey = incoming * g^z` and stores it.
    pub fn combine(&self, _chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let z = self.buf.z.lock().clone();
        let combined = group.mul(&self.incoming, &group.exp_g(&z));
        *self.buf.cypher_public_key.lock() = combined;
        Ok(())
    }
}

impl Stream for ShareStream {
    fn get_name(&self) -> &'static str {
        "PrecompShare"
    }
}
