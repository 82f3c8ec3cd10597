//! `PrecompGenerate`: fills this node's exponent and internode-key
//! buffers, its private round exponent and its slot permutation.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use parking_lot::Mutex;
use rand::RngCore;

use crate::round_buffer::RoundBuffer;

/// The shared state `PrecompGenerate`'s module writes into.
pub struct GenerateStream {
    buf: Arc<RoundBuffer>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl GenerateStream {
    /// Builds a generate stream around `buf`, drawing randomness from
    /// `rng`.
    pub fn new(buf: Arc<RoundBuffer>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            buf,
            rng: Mutex::new(rng),
        }
    }

    /// Fills every per-slot buffer in `[chunk.begin(), chunk.end())`.
    pub fn fill_slots(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let mut rng = self.rng.lock();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            self.buf.r.set(idx, group.random(&mut *rng));
            self.buf.s.set(idx, group.random(&mut *rng));
            self.buf.t.set(idx, group.random(&mut *rng));
            self.buf.u.set(idx, group.random(&mut *rng));
            self.buf.v.set(idx, group.random(&mut *rng));
            self.buf.y_r.set(idx, group.random_exponent(&mut *rng));
            self.buf.y_s.set(idx, group.random_exponent(&mut *rng));
            self.buf.y_t.set(idx, group.random_exponent(&mut *rng));
            self.buf.y_u.set(idx, group.random_exponent(&mut *rng));
            self.buf.y_v.set(idx, group.random_exponent(&mut *rng));
        }
        Ok(())
    }
}

impl Stream for GenerateStream {
    fn get_name(&self) -> &'static str {
        "PrecompGenerate"
    }
}
