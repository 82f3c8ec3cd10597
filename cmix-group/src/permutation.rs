//! In-place shuffle of per-slot output vectors driven by a round's
//! permutation table.

use num_bigint::BigUint;

/// A per-round, per-node private bijection over `[0, batch_size)`.
///
/// Aggregated across the ring of nodes, the composite permutation hides
/// the sender-to-recipient mapping. It is chosen uniformly at Generate
/// and is never transmitted.
#[derive(Debug, Clone)]
pub struct PermutationTable {
    table: Vec<u32>,
}

impl PermutationTable {
    /// Wraps an existing injective map `[0..n) -> [0..n)`.
    ///
    /// # Panics
    /// Panics if `table` is not a bijection on `0..table.len()`.
    pub fn new(table: Vec<u32>) -> Self {
        let n = table.len();
        let mut seen = vec![false; n];
        for &t in &table {
            let idx = t as usize;
            assert!(idx < n, "permutation entry {idx} out of range {n}");
            assert!(!seen[idx], "permutation entry {idx} used twice");
            seen[idx] = true;
        }
        Self { table }
    }

    /// Draws a uniformly random permutation of `[0, n)` using a
    /// Fisher-Yates shuffle.
    pub fn random<R: rand::RngCore + ?Sized>(n: usize, rng: &mut R) -> Self {
        let mut table: Vec<u32> = (0..n as u32).collect();
        for i in (1..n).rev() {
            let j = (rng.next_u64() as usize) % (i + 1);
            table.swap(i, j);
        }
        Self { table }
    }

    /// Number of slots this table permutes.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// `true` iff this table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Where slot `i` moves to.
    pub fn image_of(&self, i: usize) -> usize {
        self.table[i] as usize
    }

    /// Applies `Y[table[i]] = X[i]` for every `i`.
    pub fn permute(&self, input: &[BigUint]) -> Vec<BigUint> {
        assert_eq!(input.len(), self.table.len());
        let mut output = vec![BigUint::default(); self.table.len()];
        for (i, value) in input.iter().enumerate() {
            output[self.image_of(i)] = value.clone();
        }
        output
    }

    /// The inverse permutation: `table[inverse[i]] == i`.
    pub fn inverse(&self) -> Self {
        let mut inv = vec![0u32; self.table.len()];
        for (i, &t) in self.table.iter().enumerate() {
            inv[t as usize] = i as u32;
        }
        Self { table: inv }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::{One, ToPrimitive};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn permute_moves_values_to_their_image() {
        let table = PermutationTable::new(vec![2, 0, 1]);
        let input = vec![BigUint::from(10u32), BigUint::from(20u32), BigUint::from(30u32)];
        let output = table.permute(&input);
        assert_eq!(output[2], BigUint::from(10u32));
        assert_eq!(output[0], BigUint::from(20u32));
        assert_eq!(output[1], BigUint::from(30u32));
    }

    #[test]
    fn random_permutations_are_bijective_and_invert() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..100 {
            let table = PermutationTable::random(64, &mut rng);
            let input: Vec<BigUint> = (0..64u32).map(BigUint::from).collect();
            let permuted = table.permute(&input);
            let mut seen = vec![false; 64];
            for v in &permuted {
                let idx = v.to_u32().unwrap() as usize;
                assert!(!seen[idx]);
                seen[idx] = true;
            }
            let round_trip = table.inverse().permute(&permuted);
            assert_eq!(round_trip, input);
        }
    }

    #[test]
    fn constructing_non_bijection_panics() {
        let result = std::panic::catch_unwind(|| PermutationTable::new(vec![0, 0]));
        assert!(result.is_err());
        let _ = BigUint::one();
    }
}
