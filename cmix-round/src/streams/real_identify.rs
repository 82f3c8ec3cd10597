//! `RealIdentify`: last-node only. Clears the associated-data track's
//! accumulated keys using the round's `AdPrecomputation`, revealing the
//! recipient each payload is addressed to.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `RealIdentify`'s stream. Only ever constructed on the last node.
pub struct RealIdentifyStream {
    buf: Arc<RoundBuffer>,
}

impl RealIdentifyStream {
    /// Wraps `buf` for the identify graph. Panics if `buf` is not a
    /// last-node buffer.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        assert!(buf.is_last_node(), "RealIdentify only runs on the last node");
        Self { buf }
    }

    /// `EcrPayloadB <- AdPrecomputation * EcrPayloadB`.
    pub fn identify(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let last = self.buf.last_node.as_ref().expect("checked in new()");
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let b = cryptops::mul2(
                group,
                &last.ad_precomputation.get(idx),
                &self.buf.ecr_payload_b.get(idx),
            );
            self.buf.ecr_payload_b.set(idx, b);
        }
        Ok(())
    }
}

impl Stream for RealIdentifyStream {
    fn get_name(&self) -> &'static str {
        "RealIdentify"
    }
}
