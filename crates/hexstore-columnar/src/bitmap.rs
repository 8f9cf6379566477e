/// Packed bit vector used for column validity and boolean storage.
///
/// Bit `i` lives in word `i / 64` at position `i % 64` (LSB first).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BitVec {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl BitVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64)),
            len: 0,
            ones: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }
        if value {
            self.words[self.len / 64] |= 1u64 << bit;
            self.ones += 1;
        }
        self.len += 1;
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "BitVec index out of bounds");
        let mask = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        match (*word & mask != 0, value) {
            (true, false) => {
                *word &= !mask;
                self.ones -= 1;
            }
            (false, true) => {
                *word |= mask;
                self.ones += 1;
            }
            _ => {}
        }
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }

    pub fn count_zeros(&self) -> usize {
        self.len - self.ones
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// New vector holding the bits at `indices`, in that order.
    pub fn gather(&self, indices: &[usize]) -> BitVec {
        let mut out = BitVec::with_capacity_bits(indices.len());
        for &i in indices {
            out.push(self.get(i));
        }
        out
    }

    pub fn extend_from(&mut self, other: &BitVec) {
        for bit in other.iter() {
            self.push(bit);
        }
    }

    /// Empties the vector, returning its previous contents.
    pub fn take(&mut self) -> BitVec {
        std::mem::take(self)
    }
}

impl FromIterator<bool> for BitVec {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut out = BitVec::new();
        for bit in iter {
            out.push(bit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_set_and_count() {
        let mut bits: BitVec = (0..130).map(|i| i % 3 == 0).collect();
        assert_eq!(bits.len(), 130);
        assert_eq!(bits.count_ones(), 44);
        bits.set(1, true);
        bits.set(0, false);
        assert!(bits.get(1));
        assert!(!bits.get(0));
        assert_eq!(bits.count_ones(), 44);
        assert_eq!(bits.count_zeros(), 86);
    }

    #[test]
    fn gather_keeps_order() {
        let bits: BitVec = [true, false, true, true].into_iter().collect();
        let picked = bits.gather(&[3, 1, 1]);
        assert_eq!(picked.iter().collect::<Vec<_>>(), vec![true, false, false]);
    }
}
