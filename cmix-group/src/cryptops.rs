//! Pure cryptographic primitives ("cryptops") dispatched by graph modules.
//!
//! Each cryptop is a free function closing over a [`Group`] and acting on
//! plain [`BigUint`] values; modules own the [`crate::IntBuffer`] slots and
//! are responsible for reading inputs out of the stream, calling the
//! cryptop, and writing the result back. Keeping cryptops free of buffer
//! plumbing is what lets the graph engine dispatch them purely by an enum
//! match instead of reflection.

use blake2::Blake2bMac512;
use blake2::digest::{KeyInit, Mac, consts::U32};
use blake2::{Blake2b, Digest};
use num_bigint::BigUint;
use num_traits::Zero;

use crate::{Group, GroupError};

type Blake2b256 = Blake2b<U32>;

/// `keysBuf <- keysBuf * (publicCypherKey^privateExponent * privateKey) mod p`,
/// `cypherBuf <- cypherBuf * g^privateExponent mod p`.
///
/// Returns the updated `(keys, cypher)` pair; the caller writes them back
/// into the stream.
pub fn elgamal(
    group: &Group,
    private_key: &BigUint,
    private_exponent: &BigUint,
    public_cypher_key: &BigUint,
    keys_buf: &BigUint,
    cypher_buf: &BigUint,
) -> Result<(BigUint, BigUint), GroupError> {
    let base = group.exp(public_cypher_key, private_exponent)?;
    let factor = group.mul(&base, private_key);
    let keys = group.mul(keys_buf, &factor);
    let cypher = group.mul(cypher_buf, &group.exp_g(private_exponent));
    Ok((keys, cypher))
}

/// `yInOut <- yInOut * x mod p`.
pub fn mul2(group: &Group, x: &BigUint, y_in_out: &BigUint) -> BigUint {
    group.mul(x, y_in_out)
}

/// `cInOut <- a * b * cInOut mod p`.
pub fn mul3(group: &Group, a: &BigUint, b: &BigUint, c_in_out: &BigUint) -> BigUint {
    group.mul(&group.mul(a, b), c_in_out)
}

/// `yOut <- xIn^-1 mod p`.
pub fn inverse(group: &Group, x_in: &BigUint) -> Result<BigUint, GroupError> {
    group.inverse(x_in)
}

/// Solves `out^exponent = value mod p`.
pub fn root_coprime(
    group: &Group,
    value_in: &BigUint,
    exponent: &BigUint,
) -> Result<BigUint, GroupError> {
    group.root_coprime(value_in, exponent)
}

/// Expands a BLAKE2b-256 digest into a uniform, non-zero element of
/// `Z_p` by hashing successive counter suffixes until enough bytes are
/// produced to cover `p`'s bit length, then reducing modulo `p`.
fn expand_and_reduce(group: &Group, seed: &[u8]) -> BigUint {
    let byte_len = group.prime().bits().div_ceil(8) as usize;
    let mut out = Vec::with_capacity(byte_len + 32);
    let mut counter: u32 = 0;
    while out.len() < byte_len {
        let mut hasher = Blake2b256::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(byte_len);
    let mut value = BigUint::from_bytes_be(&out) % group.prime();
    if value.is_zero() {
        value = BigUint::from(1u8);
    }
    value
}

/// `H_G(salt || roundId || baseKey)`: a uniform hash-to-group built on
/// BLAKE2b-256.
///
/// `salt` must be exactly 32 bytes (`SaltIncorrectLength` otherwise).
/// Distinct payload tracks use distinct salt derivations: callers
/// building payload-B keys are expected to pass `blake2b(salt)` as
/// `salt` here, per [`salt_for_payload_b`].
pub fn keygen(
    group: &Group,
    salt: &[u8],
    round_id: u64,
    base_key: &BigUint,
) -> Result<BigUint, GroupError> {
    if salt.len() != 32 {
        return Err(GroupError::SaltIncorrectLength(salt.len()));
    }
    let mut seed = Vec::with_capacity(32 + 8 + base_key.to_bytes_be().len());
    seed.extend_from_slice(salt);
    seed.extend_from_slice(&round_id.to_be_bytes());
    seed.extend_from_slice(&base_key.to_bytes_be());
    Ok(expand_and_reduce(group, &seed))
}

/// Derives the salt used for payload-B keying: `BLAKE2b(salt)`.
pub fn salt_for_payload_b(salt: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(salt);
    hasher.finalize().into()
}

/// Computes the KMAC witness for `(salt, baseKey, roundId)` using a keyed
/// BLAKE2b-512 as the group's canonical cMix hash.
pub fn compute_kmac(salt: &[u8], round_id: u64, base_key: &BigUint) -> Vec<u8> {
    let key_bytes = base_key.to_bytes_be();
    let mut mac = <Blake2bMac512 as KeyInit>::new_from_slice(&key_bytes)
        .expect("blake2b accepts keys up to 64 bytes");
    mac.update(salt);
    mac.update(&round_id.to_be_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Verifies a client-supplied KMAC witness against the node's own
/// recomputation, in constant time.
pub fn verify_kmac(witness: &[u8], salt: &[u8], round_id: u64, base_key: &BigUint) -> bool {
    use subtle::ConstantTimeEq;
    let expected = compute_kmac(salt, round_id, base_key);
    expected.ct_eq(witness).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    fn group() -> Group {
        Group::new(
            BigUint::from(107u32),
            BigUint::from(4u32),
            BigUint::from(53u32),
        )
    }

    #[test]
    fn elgamal_matches_definition() {
        let g = group();
        let private_key = BigUint::from(26u32);
        let y = BigUint::from(69u32);
        let public_cypher_key = BigUint::from(13u32);
        let (keys, cypher) = elgamal(
            &g,
            &private_key,
            &y,
            &public_cypher_key,
            &BigUint::one(),
            &BigUint::one(),
        )
        .unwrap();
        let expected_keys = g.mul(&private_key, &g.exp(&public_cypher_key, &y).unwrap());
        assert_eq!(keys, expected_keys);
        assert_eq!(cypher, g.exp_g(&y));
    }

    #[test]
    fn root_coprime_inverts_exp() {
        let g = group();
        let value = BigUint::from(31u32);
        let e = BigUint::from(3u32);
        let out = root_coprime(&g, &value, &e).unwrap();
        assert_eq!(out.modpow(&e, g.prime()), value);
    }

    #[test]
    fn keygen_is_deterministic() {
        let g = group();
        let base_key = BigUint::from(99u32);
        let salt = [7u8; 32];
        let a = keygen(&g, &salt, 1, &base_key).unwrap();
        let b = keygen(&g, &salt, 1, &base_key).unwrap();
        assert_eq!(a, b);
        let salt_b = salt_for_payload_b(&salt);
        let c = keygen(&g, &salt_b, 1, &base_key).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn keygen_rejects_bad_salt_length() {
        let g = group();
        let base_key = BigUint::from(99u32);
        assert!(matches!(
            keygen(&g, &[0u8; 10], 1, &base_key),
            Err(GroupError::SaltIncorrectLength(10))
        ));
    }

    #[test]
    fn kmac_round_trips() {
        let base_key = BigUint::from(1234u32);
        let salt = [3u8; 32];
        let witness = compute_kmac(&salt, 7, &base_key);
        assert!(verify_kmac(&witness, &salt, 7, &base_key));
        assert!(!verify_kmac(&witness, &salt, 8, &base_key));
    }
}
