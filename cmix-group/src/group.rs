//! The prime-order cyclic group `Z_p` with generator `g` of order `q`.

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;

use crate::error::GroupError;

/// A fixed-prime cyclic group used for one process lifetime.
///
/// `p` is the group modulus, `g` generates the subgroup of order `q`.
/// All arithmetic exposed here reduces modulo `p` before returning; the
/// group itself never mutates once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    p: BigUint,
    g: BigUint,
    q: BigUint,
}

impl Group {
    /// Builds a group from its prime, generator and subgroup order.
    ///
    /// No primality check is performed here: the caller (configuration
    /// loading) is expected to supply parameters that were vetted offline,
    /// mirroring how the upstream node trusts its compiled-in or
    /// configured group parameters.
    pub fn new(p: BigUint, g: BigUint, q: BigUint) -> Self {
        Self { p, g, q }
    }

    /// The group modulus.
    pub fn prime(&self) -> &BigUint {
        &self.p
    }

    /// The generator of the order-`q` subgroup.
    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// The subgroup order.
    pub fn order(&self) -> &BigUint {
        &self.q
    }

    fn check_member(&self, value: &BigUint) -> Result<(), GroupError> {
        if value.is_zero() || value >= &self.p {
            return Err(GroupError::OutOfGroup);
        }
        Ok(())
    }

    /// `a * b mod p`.
    pub fn mul(&self, a: &BigUint, b: &BigUint) -> BigUint {
        (a * b) % &self.p
    }

    /// `base^exponent mod p`.
    pub fn exp(&self, base: &BigUint, exponent: &BigUint) -> Result<BigUint, GroupError> {
        self.check_member(base)?;
        Ok(base.modpow(exponent, &self.p))
    }

    /// `g^exponent mod p`.
    pub fn exp_g(&self, exponent: &BigUint) -> BigUint {
        self.g.modpow(exponent, &self.p)
    }

    /// The modular inverse of `a` in `Z_p^*`, computed via Fermat's little
    /// theorem (`a^(p-2) mod p`) since `p` is prime.
    pub fn inverse(&self, a: &BigUint) -> Result<BigUint, GroupError> {
        self.check_member(a)?;
        let p_minus_2 = &self.p - BigUint::from(2u8);
        Ok(a.modpow(&p_minus_2, &self.p))
    }

    /// Solves `out^exponent = value mod p` for `out`, given
    /// `gcd(exponent, q) = 1`.
    ///
    /// Uses Fermat's approach: `out = value^(exponent^{-1} mod q) mod p`.
    pub fn root_coprime(
        &self,
        value: &BigUint,
        exponent: &BigUint,
    ) -> Result<BigUint, GroupError> {
        self.check_member(value)?;
        let inv_exponent = mod_inverse(exponent, &self.q).ok_or(GroupError::ExponentNotCoprime)?;
        Ok(value.modpow(&inv_exponent, &self.p))
    }

    /// A uniformly random element of `[2, p-1]`.
    pub fn random<R: RngCore + ?Sized>(&self, rng: &mut R) -> BigUint {
        let lower = BigUint::from(2u8);
        let upper = &self.p - BigUint::one();
        rng.gen_biguint_range(&lower, &upper)
    }

    /// A uniformly random exponent in `[1, q)`.
    pub fn random_exponent<R: RngCore + ?Sized>(&self, rng: &mut R) -> BigUint {
        let lower = BigUint::one();
        rng.gen_biguint_range(&lower, &self.q)
    }

    /// `true` iff every slice decodes to an element `< p` (and is non-empty).
    pub fn bytes_inside(&self, slices: &[&[u8]]) -> bool {
        slices.iter().all(|bytes| {
            if bytes.is_empty() {
                return false;
            }
            BigUint::from_bytes_be(bytes) < self.p
        })
    }

    /// Decodes `bytes` as a big-endian group element, failing if it is
    /// not `< p`.
    pub fn set_bytes(&self, bytes: &[u8]) -> Result<BigUint, GroupError> {
        let value = BigUint::from_bytes_be(bytes);
        if value >= self.p {
            return Err(GroupError::OutsideOfGroup);
        }
        Ok(value)
    }
}

/// Computes `a^{-1} mod m` via the extended Euclidean algorithm, returning
/// `None` if `a` and `m` are not coprime.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let a = BigInt::from(a.clone());
    let m = BigInt::from(m.clone());
    let gcd = a.extended_gcd(&m);
    if gcd.gcd != BigInt::one() {
        return None;
    }
    let result = gcd.x.mod_floor(&m);
    result.to_biguint()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_group() -> Group {
        // p = 107, g = 4, q = 53 (order of the subgroup generated by 4 in Z_107^*,
        // whose multiplicative group has order 106 = 2*53).
        Group::new(
            BigUint::from(107u32),
            BigUint::from(4u32),
            BigUint::from(53u32),
        )
    }

    #[test]
    fn exp_and_inverse_round_trip() {
        let g = small_group();
        let a = BigUint::from(26u32);
        let inv = g.inverse(&a).unwrap();
        assert_eq!(g.mul(&a, &inv), BigUint::one());
    }

    #[test]
    fn root_coprime_round_trips() {
        let g = small_group();
        let value = BigUint::from(31u32);
        // 3 is coprime with q = 53.
        let exponent = BigUint::from(3u32);
        let root = g.root_coprime(&value, &exponent).unwrap();
        assert_eq!(root.modpow(&exponent, g.prime()), value);
    }

    #[test]
    fn exp_rejects_out_of_group() {
        let g = small_group();
        let zero = BigUint::zero();
        assert!(matches!(
            g.exp(&zero, &BigUint::from(2u32)),
            Err(GroupError::OutOfGroup)
        ));
    }
}
