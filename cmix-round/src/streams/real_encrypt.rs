//! `RealEncrypt`: last-node only. Final multiply that clears the
//! message track's accumulated keys, yielding plaintext.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `RealEncrypt`'s stream. Only ever constructed on the last node.
pub struct RealEncryptStream {
    buf: Arc<RoundBuffer>,
}

impl RealEncryptStream {
    /// Wraps `buf` for the encrypt graph. Panics if `buf` is not a
    /// last-node buffer.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        assert!(buf.is_last_node(), "RealEncrypt only runs on the last node");
        Self { buf }
    }

    /// `EcrPayloadA <- MessagePrecomputation * EcrPayloadA`.
    pub fn encrypt(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let last = self.buf.last_node.as_ref().expect("checked in new()");
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let a = cryptops::mul2(
                group,
                &last.message_precomputation.get(idx),
                &self.buf.ecr_payload_a.get(idx),
            );
            self.buf.ecr_payload_a.set(idx, a);
        }
        Ok(())
    }
}

impl Stream for RealEncryptStream {
    fn get_name(&self) -> &'static str {
        "RealEncrypt"
    }
}
