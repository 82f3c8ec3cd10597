//! Fixed-length buffers of group elements with write-through subviews.

use std::sync::Arc;

use num_bigint::BigUint;
use parking_lot::Mutex;

/// A fixed-length, indexed vector of `Z_p` elements.
///
/// `IntBuffer` is the storage unit for every per-round keying stream (`R`,
/// `S`, `T`, `U`, `V`, their exponents, and the phase-local scratch
/// buffers built on top of them). Length is fixed at construction;
/// resizing is not supported.
///
/// A [`IntBuffer::sub_buffer`] is a *view*: it shares the same backing
/// storage as its parent, so writes through the view are visible to the
/// parent and to any other overlapping view. Each element is stored
/// behind its own `Mutex`, which is what lets disjoint-chunk workers in
/// the graph engine mutate different slots of the same buffer from
/// different threads without any of them observing torn writes, while
/// still being ordinary safe Rust.
#[derive(Debug, Clone)]
pub struct IntBuffer {
    data: Arc<Vec<Mutex<BigUint>>>,
    offset: usize,
    len: usize,
}

impl IntBuffer {
    /// Allocates a new buffer of `len` slots, each initialized to
    /// `default_value`.
    pub fn new(len: usize, default_value: BigUint) -> Self {
        let data = (0..len).map(|_| Mutex::new(default_value.clone())).collect();
        Self {
            data: Arc::new(data),
            offset: 0,
            len,
        }
    }

    /// Builds a buffer from an explicit sequence of values.
    pub fn from_values(values: Vec<BigUint>) -> Self {
        let len = values.len();
        let data = values.into_iter().map(Mutex::new).collect();
        Self {
            data: Arc::new(data),
            offset: 0,
            len,
        }
    }

    /// Number of slots visible through this view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` iff this view has no slots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the value at `index` (relative to this view).
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn get(&self, index: usize) -> BigUint {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        self.data[self.offset + index].lock().clone()
    }

    /// Writes `value` at `index` (relative to this view). Visible through
    /// the parent buffer and any overlapping view.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn set(&self, index: usize, value: BigUint) {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        *self.data[self.offset + index].lock() = value;
    }

    /// Applies `f` to the value at `index` in place, avoiding the clone a
    /// `get`+`set` pair would otherwise require.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn update(&self, index: usize, f: impl FnOnce(&BigUint) -> BigUint) {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        let mut guard = self.data[self.offset + index].lock();
        let updated = f(&guard);
        *guard = updated;
    }

    /// Returns a write-through view over `[begin, end)` of this buffer.
    ///
    /// # Panics
    /// Panics if the range is out of bounds or `begin > end`.
    pub fn sub_buffer(&self, begin: usize, end: usize) -> Self {
        assert!(begin <= end && end <= self.len, "sub_buffer range out of bounds");
        Self {
            data: Arc::clone(&self.data),
            offset: self.offset + begin,
            len: end - begin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    #[test]
    fn subbuffer_writes_through_to_parent() {
        let parent = IntBuffer::new(4, BigUint::one());
        let view = parent.sub_buffer(1, 3);
        view.set(0, BigUint::from(42u32));
        assert_eq!(parent.get(1), BigUint::from(42u32));
        assert_eq!(view.get(0), BigUint::from(42u32));
    }

    #[test]
    fn overlapping_views_share_storage() {
        let parent = IntBuffer::new(4, BigUint::one());
        let a = parent.sub_buffer(0, 4);
        let b = parent.sub_buffer(0, 2);
        a.set(1, BigUint::from(7u32));
        assert_eq!(b.get(1), BigUint::from(7u32));
    }
}
