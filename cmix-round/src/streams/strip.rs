//! `PrecompStrip`: last-node only. Inverts the accumulated key product
//! and multiplies it by the fully-revealed cypher text to yield the
//! round's precomputations.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `PrecompStrip`'s stream. Only ever constructed on the last node.
pub struct StripStream {
    buf: Arc<RoundBuffer>,
}

impl StripStream {
    /// Wraps `buf` for the strip graph. Panics if `buf` has no
    /// [`crate::round_buffer::LastNodeBuffers`] — the graph builder is
    /// responsible for only calling this on the last node.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        assert!(buf.is_last_node(), "PrecompStrip only runs on the last node");
        Self { buf }
    }

    /// `MessagePrecomputation <- revealed_cypher_msg * keys_msg^{-1}`,
    /// `AdPrecomputation <- revealed_cypher_ad * keys_ad^{-1}`.
    pub fn strip(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let last = self.buf.last_node.as_ref().expect("checked in new()");
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let inv_keys_msg =
                cryptops::inverse(group, &self.buf.keys_msg.get(idx)).map_err(|_| GraphError::OutsideOfGroup)?;
            let mp = group.mul(&self.buf.cypher_msg.get(idx), &inv_keys_msg);
            last.message_precomputation.set(idx, mp);

            let inv_keys_ad =
                cryptops::inverse(group, &self.buf.keys_ad.get(idx)).map_err(|_| GraphError::OutsideOfGroup)?;
            let rp = group.mul(&self.buf.cypher_ad.get(idx), &inv_keys_ad);
            last.ad_precomputation.set(idx, rp);
        }
        Ok(())
    }
}

impl Stream for StripStream {
    fn get_name(&self) -> &'static str {
        "PrecompStrip"
    }
}
