//! `PrecompPermute`: ElGamal with the second internode-key pair, then a
//! whole-batch permutation of the accumulated key/cypher tracks.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `PrecompPermute`'s stream.
pub struct PermuteStream {
    buf: Arc<RoundBuffer>,
}

impl PermuteStream {
    /// Wraps `buf` for the permute graph.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        Self { buf }
    }

    /// ElGamal on `(r, y_r)` for the message track, `(u, y_u)` for the
    /// associated-data track — the node's second exponent contribution.
    pub fn elgamal_permuted_keys(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let cpk = self.buf.cypher_public_key.lock().clone();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let (keys, cyph) = cryptops::elgamal(
                group,
                &self.buf.r.get(idx),
                &self.buf.y_r.get(idx),
                &cpk,
                &self.buf.keys_msg.get(idx),
                &self.buf.cypher_msg.get(idx),
            )
            .map_err(|_| GraphError::OutsideOfGroup)?;
            self.buf.keys_msg.set(idx, keys);
            self.buf.cypher_msg.set(idx, cyph);

            let (ad_keys, ad_cyph) = cryptops::elgamal(
                group,
                &self.buf.u.get(idx),
                &self.buf.y_u.get(idx),
                &cpk,
                &self.buf.keys_ad.get(idx),
                &self.buf.cypher_ad.get(idx),
            )
            .map_err(|_| GraphError::OutsideOfGroup)?;
            self.buf.keys_ad.set(idx, ad_keys);
            self.buf.cypher_ad.set(idx, ad_cyph);
        }
        Ok(())
    }

    /// Applies this node's permutation to the four accumulated tracks
    /// in one pass over the whole batch: `Y[table[i]] = X[i]`.
    pub fn permute_batch(&self, chunk: Chunk) -> Result<(), GraphError> {
        let guard = self.buf.permutation.lock();
        let table = guard.as_ref().expect("permutation generated during PrecompGenerate");
        let len = chunk.len() as usize;
        debug_assert_eq!(len, table.len(), "permute module must run over the whole batch");

        for buffer in [
            &self.buf.keys_msg,
            &self.buf.cypher_msg,
            &self.buf.keys_ad,
            &self.buf.cypher_ad,
        ] {
            let values: Vec<_> = (0..len).map(|i| buffer.get(i)).collect();
            let permuted = table.permute(&values);
            for (i, value) in permuted.into_iter().enumerate() {
                buffer.set(i, value);
            }
        }
        Ok(())
    }
}

impl Stream for PermuteStream {
    fn get_name(&self) -> &'static str {
        "PrecompPermute"
    }
}
