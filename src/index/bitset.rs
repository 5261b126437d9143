//! Fixed-capacity bit vector used to represent line selections.
//!
//! The set-bit count is maintained incrementally: `or`/`and` count the bits
//! that changed in each combined word instead of re-scanning the vector.
//! `first`/`last` are bounds on the set bits, not exact extrema. They widen on
//! `set`/`or` and narrow on `and`, but clearing a bit never tightens them.

const WORD_BITS: usize = 32;
const NO_BIT: usize = usize::MAX;

/// Number of set bits for every byte value.
static BIT_COUNT: [u8; 256] = build_bit_count();

const fn build_bit_count() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8 & 1) + table[i / 2];
        i += 1;
    }
    table
}

#[inline]
fn word_count_ones(w: u32) -> usize {
    BIT_COUNT[(w & 0xff) as usize] as usize
        + BIT_COUNT[((w >> 8) & 0xff) as usize] as usize
        + BIT_COUNT[((w >> 16) & 0xff) as usize] as usize
        + BIT_COUNT[(w >> 24) as usize] as usize
}

#[derive(Debug, Clone)]
pub struct BitSet {
    words: Vec<u32>,
    total: usize,
    count: usize,
    first: usize,
    last: usize,
}

impl Default for BitSet {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BitSet {
    /// Zero-length vector that needs no allocation.
    pub const EMPTY: BitSet = BitSet {
        words: Vec::new(),
        total: 0,
        count: 0,
        first: NO_BIT,
        last: 0,
    };

    /// Allocate a cleared vector covering `total` bits.
    pub fn new(total: usize) -> Self {
        Self {
            words: vec![0; total / WORD_BITS + 1],
            total,
            count: 0,
            first: NO_BIT,
            last: 0,
        }
    }

    /// Number of bits the vector covers.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Running number of set bits.
    pub fn count_ones(&self) -> usize {
        self.count
    }

    /// Lower bound of the set bits, `None` if nothing was ever set.
    pub fn first_hint(&self) -> Option<usize> {
        (self.first != NO_BIT).then_some(self.first)
    }

    /// Upper bound of the set bits, `None` if nothing was ever set.
    pub fn last_hint(&self) -> Option<usize> {
        (self.first != NO_BIT).then_some(self.last)
    }

    pub fn fill(&mut self, value: bool) {
        if value && self.total > 0 {
            self.words.fill(u32::MAX);
            self.mask_tail();
            self.count = self.total;
            self.first = 0;
            self.last = self.total - 1;
        } else {
            self.words.fill(0);
            self.count = 0;
            self.first = NO_BIT;
            self.last = 0;
        }
    }

    // Bits at or past `total` must stay zero so word popcounts are exact.
    fn mask_tail(&mut self) {
        let used = self.total % WORD_BITS;
        let last_word = self.total / WORD_BITS;
        if let Some(w) = self.words.get_mut(last_word) {
            *w &= if used == 0 { 0 } else { (1u32 << used) - 1 };
        }
        for w in self.words.iter_mut().skip(last_word + 1) {
            *w = 0;
        }
    }

    pub fn set(&mut self, bit: usize) {
        debug_assert!(bit < self.total, "bit {} out of {}", bit, self.total);
        let mask = 1u32 << (bit % WORD_BITS);
        let word = &mut self.words[bit / WORD_BITS];
        if *word & mask == 0 {
            *word |= mask;
            self.count += 1;
        }
        self.first = self.first.min(bit);
        self.last = self.last.max(bit);
    }

    pub fn reset(&mut self, bit: usize) {
        debug_assert!(bit < self.total, "bit {} out of {}", bit, self.total);
        let mask = 1u32 << (bit % WORD_BITS);
        let word = &mut self.words[bit / WORD_BITS];
        if *word & mask != 0 {
            *word &= !mask;
            self.count -= 1;
        }
    }

    pub fn get(&self, bit: usize) -> bool {
        if bit >= self.total {
            return false;
        }
        (self.words[bit / WORD_BITS] >> (bit % WORD_BITS)) & 1 == 1
    }

    /// Union with `src`, scanning only the words inside `src`'s bounds.
    pub fn or(&mut self, src: &BitSet) {
        let Some(src_first) = src.first_hint() else {
            return;
        };
        let limit = self.words.len().min(src.words.len());
        let start = src_first / WORD_BITS;
        let end = (src.last / WORD_BITS + 1).min(limit);

        for i in start..end {
            let old = self.words[i];
            let new = old | src.words[i];
            if new != old {
                self.count += word_count_ones(new ^ old);
                self.words[i] = new;
            }
        }

        self.first = self.first.min(src_first);
        self.last = self.last.max(src.last);
    }

    /// Intersection with `src` over every word.
    pub fn and(&mut self, src: &BitSet) {
        let limit = self.words.len().min(src.words.len());
        for i in 0..self.words.len() {
            let old = self.words[i];
            let new = if i < limit { old & src.words[i] } else { 0 };
            if new != old {
                self.count -= word_count_ones(new ^ old);
                self.words[i] = new;
            }
        }

        self.first = self.first.max(src.first);
        self.last = self.last.min(src.last);
    }

    /// Index of the `n`-th set bit (0-based), scanning the bounded range.
    pub fn find_nth_set(&self, n: usize) -> Option<usize> {
        let first = self.first_hint()?;
        let last = self.last.min(self.total.checked_sub(1)?);
        let mut seen = 0;
        for bit in first..=last {
            if self.get(bit) {
                if seen == n {
                    return Some(bit);
                }
                seen += 1;
            }
        }
        None
    }

    /// Set bit indices in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        let total = self.total;
        self.words
            .iter()
            .enumerate()
            .filter(|(_, w)| **w != 0)
            .flat_map(move |(i, &w)| {
                (0..WORD_BITS)
                    .filter(move |b| (w >> b) & 1 == 1)
                    .map(move |b| i * WORD_BITS + b)
            })
            .take_while(move |&bit| bit < total)
    }
}
