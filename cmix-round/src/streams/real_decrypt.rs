//! `RealDecrypt`: derives each client's per-round keys from their salt
//! and base key, verifies their KMAC witness, then multiplies the keys
//! and this node's internode key into the payload cyphertexts.

use std::sync::Arc;

use cmix_graph::{Chunk, GraphError, Stream};
use cmix_group::cryptops;
use cmix_types::{ErrorKind, wire::Slot};

use crate::base_key_store::BaseKeyStore;
use crate::round_buffer::RoundBuffer;

/// `RealDecrypt`'s stream.
pub struct RealDecryptStream {
    buf: Arc<RoundBuffer>,
    slots: Vec<Slot>,
    base_keys: Arc<dyn BaseKeyStore>,
}

impl RealDecryptStream {
    /// Wraps `buf` for the decrypt graph, over the incoming client
    /// `slots` (indexed by `Slot::index`) and `base_keys` lookup.
    pub fn new(buf: Arc<RoundBuffer>, slots: Vec<Slot>, base_keys: Arc<dyn BaseKeyStore>) -> Self {
        Self { buf, slots, base_keys }
    }

    /// Ingests ciphertext and keys in per-client material: decodes
    /// `payload_a`/`payload_b`, derives `keys_payload_a`/`keys_payload_b`
    /// via `keygen`, and verifies the client's KMAC witness.
    ///
    /// Every failure here is slot-local (§7, §9): a bad slot is reported
    /// to [`RoundBuffer::record_client_failure`] and skipped, leaving its
    /// buffers at their allocated identity values, rather than failing
    /// the whole phase.
    pub fn ingest_and_keygen(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        let round_id = self.buf.round_id().into_inner();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let Some(slot) = self.slots.get(idx) else {
                self.buf.record_client_failure(i, ErrorKind::OutsideOfBatch { index: i, batch_size: self.buf.batch_size() });
                continue;
            };

            let Ok(payload_a) = group.set_bytes(&slot.payload_a) else {
                self.buf.record_client_failure(i, ErrorKind::OutsideOfGroup { index: i });
                continue;
            };
            let Ok(payload_b) = group.set_bytes(&slot.payload_b) else {
                self.buf.record_client_failure(i, ErrorKind::OutsideOfGroup { index: i });
                continue;
            };

            let Some(base_key) = self.base_keys.base_key(&slot.sender_id) else {
                self.buf.record_client_failure(i, ErrorKind::UserIdTooShort { index: i });
                continue;
            };

            if slot.salt.len() != 32 {
                self.buf.record_client_failure(i, ErrorKind::SaltIncorrectLength { index: i, len: slot.salt.len() });
                continue;
            }
            let Ok(keys_a) = cryptops::keygen(group, &slot.salt, round_id, &base_key) else {
                self.buf.record_client_failure(i, ErrorKind::OutsideOfGroup { index: i });
                continue;
            };
            let salt_b = cryptops::salt_for_payload_b(&slot.salt);
            let Ok(keys_b) = cryptops::keygen(group, &salt_b, round_id, &base_key) else {
                self.buf.record_client_failure(i, ErrorKind::OutsideOfGroup { index: i });
                continue;
            };

            if let Some(witness) = slot.kmacs.first() {
                if !cryptops::verify_kmac(witness, &slot.salt, round_id, &base_key) {
                    self.buf.record_client_failure(i, ErrorKind::KmacMismatch { index: i });
                    continue;
                }
            }

            self.buf.ecr_payload_a.set(idx, payload_a);
            self.buf.ecr_payload_b.set(idx, payload_b);
            self.buf.keys_payload_a.set(idx, keys_a);
            self.buf.keys_payload_b.set(idx, keys_b);
        }
        Ok(())
    }

    /// `EcrPayloadA <- KeysPayloadA * R * EcrPayloadA`,
    /// `EcrPayloadB <- KeysPayloadB * U * EcrPayloadB`.
    pub fn multiply_in_keys(&self, chunk: Chunk) -> Result<(), GraphError> {
        let group = self.buf.group();
        for i in chunk.begin()..chunk.end() {
            let idx = i as usize;
            let a = cryptops::mul3(
                group,
                &self.buf.keys_payload_a.get(idx),
                &self.buf.r.get(idx),
                &self.buf.ecr_payload_a.get(idx),
            );
            self.buf.ecr_payload_a.set(idx, a);

            let b = cryptops::mul3(
                group,
                &self.buf.keys_payload_b.get(idx),
                &self.buf.u.get(idx),
                &self.buf.ecr_payload_b.get(idx),
            );
            self.buf.ecr_payload_b.set(idx, b);
        }
        Ok(())
    }
}

impl Stream for RealDecryptStream {
    fn get_name(&self) -> &'static str {
        "RealDecrypt"
    }
}
