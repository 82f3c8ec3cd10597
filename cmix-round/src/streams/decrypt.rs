//! `PrecompDecrypt`: ElGamal-encrypts the message and associated-data
//! key streams under the team's `CypherPublicKey`.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;

use crate::round_buffer::RoundBuffer;

/// `PrecompDecrypt`'s stream.
pub struct DecryptStream {
    buf: Arc<RoundBuffer>,
}

impl DecryptStream {
    /// Wraps `buf` for the decrypt graph.
    pub fn new(buf: Arc<RoundBuffer>) -> Self {
        Self { buf }
    }

    /// ElGamal on `(s, y_s)` for the message track.
    pub fn elgamal_message(&self, chunk: Chunk) -> Result<(), GraphError> {
        self.elgamal_track(chunk, &self.buf.s, &self.buf.y_s, &self.buf.keys_msg, &self.buf.cypher_msg)
    }

    /// ElGamal on `(v, y_v)` for the associated-data track.
    pub fn elgamal_ad(&self, chunk: Chunk) -> Result<(), GraphError> {
        self.elgamal_track(chunk, &self.buf.v, &self.buf.y_v, &self.buf.keys_ad, &self.buf.cypher_ad)
    }

    fn elgamal_track(
        &self,
        chunk: Chunk,
        private_key: &cmix_group::IntBuffer,
        private_exponent: &cmix_group::IntBuffer,
        keys: &cmix_group::IntBuffer,
        cypher: &cmix_group::IntBuffer,
    ) -> Result<(), GraphError> {
        let group = self.buf.group();
        let cpk = self.buf.cypher_public_key.lock().clone();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let (new_keys, new_cypher) = cryptops::elgamal(
                group,
                &private_key.get(idx),
                &private_exponent.get(idx),
                &cpk,
                &keys.get(idx),
                &cypher.get(idx),
            )
            .map_err(|_| GraphError::OutsideOfGroup)?;
            keys.set(idx, new_keys);
            cypher.set(idx, new_cypher);
        }
        Ok(())
    }
}

impl Stream for DecryptStream {
    fn get_name(&self) -> &'static str {
        "PrecompDecrypt"
    }
}
