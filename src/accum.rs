use bitvec::prelude::*;

/// Number of 64-bit words in an accumulator.
pub const ACCUM_WORDS: usize = 2;
/// Widest encoding an accumulator can hold, in bits.
pub const ACCUM_BITS: usize = 64 * ACCUM_WORDS;

type Bits = BitArray<[u64; ACCUM_WORDS], Lsb0>;

/// Wide instruction value plus the mask of bits some atom has claimed.
///
/// Bits outside `claimed` are always zero in `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accum {
    value: Bits,
    claimed: Bits,
}

impl Default for Accum {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn low_mask(len: usize) -> u64 {
    if len >= 64 {
        !0
    } else {
        (1u64 << len) - 1
    }
}

impl Accum {
    pub fn new() -> Self {
        Self {
            value: BitArray::new([0; ACCUM_WORDS]),
            claimed: BitArray::new([0; ACCUM_WORDS]),
        }
    }

    /// Accumulator seeded with a table row's fixed value/mask in word 0.
    pub fn with_fixed(val: u64, mask: u64) -> Self {
        let mut acc = Self::new();
        acc.value.as_raw_mut_slice()[0] = val & mask;
        acc.claimed.as_raw_mut_slice()[0] = mask;
        acc
    }

    pub fn word(&self, idx: usize) -> u64 {
        self.value.as_raw_slice().get(idx).copied().unwrap_or(0)
    }

    pub fn claimed_word(&self, idx: usize) -> u64 {
        self.claimed.as_raw_slice().get(idx).copied().unwrap_or(0)
    }

    pub fn is_claimed(&self, bit: usize) -> bool {
        self.claimed.get(bit).map(|b| *b).unwrap_or(false)
    }

    /// Reads `len` bits at `pos`. Bits past the accumulator read as zero.
    pub fn field(&self, pos: usize, len: usize) -> u64 {
        if len == 0 || pos >= ACCUM_BITS {
            return 0;
        }
        let end = (pos + len.min(64)).min(ACCUM_BITS);
        self.value[pos..end].load_le::<u64>()
    }

    /// Writes the low `len` bits of `num` at `pos` and claims them.
    ///
    /// Fails without touching anything if a claimed bit in the range holds a
    /// different value, or if the range does not fit.
    pub fn set_field(&mut self, pos: usize, len: usize, num: u64) -> bool {
        if len == 0 {
            return true;
        }
        if len > 64 || pos + len > ACCUM_BITS {
            return false;
        }
        let num = num & low_mask(len);
        let range = pos..pos + len;
        let held = self.claimed[range.clone()].load_le::<u64>();
        let cur = self.value[range.clone()].load_le::<u64>();
        if (cur ^ num) & held != 0 {
            return false;
        }
        self.value[range.clone()].store_le(num);
        self.claimed[range].fill(true);
        true
    }

    /// True when no bit claimed by both sides disagrees.
    pub fn compatible(&self, other: &Accum) -> bool {
        let av = self.value.as_raw_slice();
        let ac = self.claimed.as_raw_slice();
        let bv = other.value.as_raw_slice();
        let bc = other.claimed.as_raw_slice();
        (0..ACCUM_WORDS).all(|i| (av[i] ^ bv[i]) & ac[i] & bc[i] == 0)
    }

    /// Bitwise union of two compatible accumulators.
    pub fn union(&self, other: &Accum) -> Accum {
        let mut res = *self;
        let ov = other.value.as_raw_slice();
        let oc = other.claimed.as_raw_slice();
        for (w, o) in res.value.as_raw_mut_slice().iter_mut().zip(ov) {
            *w |= o;
        }
        for (w, o) in res.claimed.as_raw_mut_slice().iter_mut().zip(oc) {
            *w |= o;
        }
        res
    }

    /// First `len` bytes of the value, little-endian.
    pub fn to_le_bytes(&self, len: usize) -> Vec<u8> {
        let words = self.value.as_raw_slice();
        (0..len.min(ACCUM_BITS / 8))
            .map(|j| (words[j >> 3] >> (8 * (j & 7))) as u8)
            .collect()
    }
}
