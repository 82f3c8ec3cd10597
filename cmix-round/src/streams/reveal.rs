//! `PrecompReveal`: removes this node's homomorphic blinding layer from
//! the accumulated cypher texts via `RootCoprime`.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `PrecompReveal`'s stream.
pub struct RevealStream {
    buf: Arc<RoundBuffer>,
}

impl RevealStream {
    /// Wraps `buf` for the reveal graph.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        Self { buf }
    }

    /// `cypher <- cypher^z mod p`, computed as the `z_inverse`-th root so
    /// the existing `RootCoprime` cryptop can express it.
    pub fn reveal(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let z_inverse = self.buf.z_inverse.lock().clone();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let msg = cryptops::root_coprime(group, &self.buf.cypher_msg.get(idx), &z_inverse)
                .map_err(|_| GraphError::OutsideOfGroup)?;
            self.buf.cypher_msg.set(idx, msg);
            let ad = cryptops::root_coprime(group, &self.buf.cypher_ad.get(idx), &z_inverse)
                .map_err(|_| GraphError::OutsideOfGroup)?;
            self.buf.cypher_ad.set(idx, ad);
        }
        Ok(())
    }
}

impl Stream for RevealStream {
    fn get_name(&self) -> &'static str {
        "PrecompReveal"
    }
}
