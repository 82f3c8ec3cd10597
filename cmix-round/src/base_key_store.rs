//! The lookup a node needs to find a client's base key during realtime.
//!
//! Persisting and provisioning that registry (how a base key gets there
//! in the first place, durability, eviction) is explicitly out of scope
//! for this crate; `cmix-node` owns wiring a real backend in behind this
//! trait. What belongs here is the shape `RealDecrypt` depends on.

use num_bigint::BigUint;

/// Resolves a client's negotiated base key from their canonical id.
pub trait BaseKeyStore: Send + Sync {
    /// Returns the base key for `user_id`, or `None` if the node has no
    /// registration for it (the slot is then a `UserIdTooShort`-class
    /// failure handled by the caller).
    fn base_key(&self, user_id: &[u8]) -> Option<BigUint>;
}

/// An in-memory [`BaseKeyStore`], sufficient for tests and for small
/// deployments that provision keys out of band.
#[derive(Debug, Default)]
pub struct InMemoryBaseKeyStore {
    keys: parking_lot::RwLock<std::collections::HashMap<Vec<u8>, BigUint>>,
}

impl InMemoryBaseKeyStore {
    /// Builds an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a client's base key.
    pub fn insert(&self, user_id: Vec<u8>, base_key: BigUint) {
        self.keys.write().insert(user_id, base_key);
    }
}

impl BaseKeyStore for InMemoryBaseKeyStore {
    fn base_key(&self, user_id: &[u8]) -> Option<BigUint> {
        self.keys.read().get(user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_registered_key() {
        let store = InMemoryBaseKeyStore::new();
        store.insert(b"client-1".to_vec(), BigUint::from(42u32));
        assert_eq!(store.base_key(b"client-1"), Some(BigUint::from(42u32)));
        assert_eq!(store.base_key(b"nobody"), None);
    }
}
