//! `RealPermute`: multiplies in this node's second internode-key
//! contribution, then applies the round's permutation to the payload
//! cyphertexts.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `RealPermute`'s stream.
pub struct RealPermuteStream {
    buf: Arc<RoundBuffer>,
}

impl RealPermuteStream {
    /// Wraps `buf` for the permute graph.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        Self { buf }
    }

    /// `EcrPayloadA <- S * EcrPayloadA`, `EcrPayloadB <- V * EcrPayloadB`.
    pub fn multiply_in_keys(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let a = cryptops::mul2(group, &self.buf.s.get(idx), &self.buf.ecr_payload_a.get(idx));
            self.buf.ecr_payload_a.set(idx, a);
            let b = cryptops::mul2(group, &self.buf.v.get(idx), &self.buf.ecr_payload_b.get(idx));
            self.buf.ecr_payload_b.set(idx, b);
        }
        Ok(())
    }

    /// Applies this node's permutation to the payload tracks in one
    /// whole-batch pass: `Y[table[i]] = X[i]`.
    pub fn permute_batch(&self, chunk: Chunk) -> Result<(), GraphError> {
        let guard = self.buf.permutation.lock();
        let table = guard.as_ref().expect("permutation generated during PrecompGenerate");
        let len = chunk.len() as usize;
        debug_assert_eq!(len, table.len(), "permute module must run over the whole batch");

        for buffer in [&self.buf.ecr_payload_a, &self.buf.ecr_payload_b] {
            let values: Vec<_> = (0..len).map(|i| buffer.get(i)).collect();
            let permuted = table.permute(&values);
            for (i, value) in permuted.into_iter().enumerate() {
                buffer.set(i, value);
            }
        }
        Ok(())
    }
}

impl Stream for RealPermuteStream {
    fn get_name(&self) -> &'static str {
        "RealPermute"
    }
}
