use zerocopy::{byteorder::little_endian::U64, FromBytes};

pub type MaskWord = u64;

pub const MASK_WORD_BITS: usize = MaskWord::BITS as usize;
pub const MASK_WORD_SIZE: usize = size_of::<MaskWord>();

/// Number of mask words needed for `slots` bits
#[inline]
pub const fn mask_words(slots: usize) -> usize {
    slots.div_ceil(MASK_WORD_BITS)
}

/// Number of mask bytes needed for `slots` bits
#[inline]
pub const fn mask_bytes(slots: usize) -> usize {
    mask_words(slots) * MASK_WORD_SIZE
}

fn ones_from(words: &[U64], start: usize) -> impl Iterator<Item = usize> + '_ {
    let first_word = start / MASK_WORD_BITS;
    words
        .iter()
        .enumerate()
        .skip(first_word)
        .flat_map(move |(word_idx, word)| {
            let mut word = word.get();
            if word_idx == first_word {
                word &= MaskWord::MAX << (start % MASK_WORD_BITS);
            }
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(word_idx * MASK_WORD_BITS + bit)
            })
        })
}

/// Presence bitset stored as little-endian u64 words, least significant bit first.
///
/// The bit for slot `i` is bit `i % 64` of word `i / 64`.
pub struct PresenceMask<B> {
    bytes: B,
}

impl<B: AsRef<[u8]>> PresenceMask<B> {
    /// Wraps a mask region, its length must be a multiple of the word size
    pub fn new(bytes: B) -> Self {
        debug_assert_eq!(bytes.as_ref().len() % MASK_WORD_SIZE, 0);
        Self { bytes }
    }

    #[inline]
    fn words(&self) -> &[U64] {
        <[U64]>::ref_from_bytes(self.bytes.as_ref()).unwrap()
    }

    /// Number of addressable bits
    pub fn capacity(&self) -> usize {
        self.bytes.as_ref().len() * 8
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        self.words()[i / MASK_WORD_BITS].get() & (1 << (i % MASK_WORD_BITS)) != 0
    }

    pub fn count_ones(&self) -> usize {
        self.words()
            .iter()
            .map(|w| w.get().count_ones() as usize)
            .sum()
    }

    /// Iterates the indexes of the set bits in increasing order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        ones_from(self.words(), 0)
    }

    /// Iterates the indexes of the set bits >= `start` in increasing order
    pub fn iter_ones_from(&self, start: usize) -> impl Iterator<Item = usize> + '_ {
        ones_from(self.words(), start)
    }

    /// Highest set bit, if any
    pub fn last_one(&self) -> Option<usize> {
        self.words()
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| w.get() != 0)
            .map(|(word_idx, w)| {
                word_idx * MASK_WORD_BITS + (MASK_WORD_BITS - 1 - w.get().leading_zeros() as usize)
            })
    }
}

impl<'a> PresenceMask<&'a [u8]> {
    /// Like [Self::iter_ones_from], borrowing the mask bytes instead of the mask
    pub fn into_iter_ones_from(self, start: usize) -> impl Iterator<Item = usize> + 'a {
        ones_from(<[U64]>::ref_from_bytes(self.bytes).unwrap(), start)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PresenceMask<B> {
    #[inline]
    fn words_mut(&mut self) -> &mut [U64] {
        <[U64]>::mut_from_bytes(self.bytes.as_mut()).unwrap()
    }

    #[inline]
    pub fn set(&mut self, i: usize) {
        let word = &mut self.words_mut()[i / MASK_WORD_BITS];
        word.set(word.get() | (1 << (i % MASK_WORD_BITS)));
    }

    #[inline]
    pub fn clear(&mut self, i: usize) {
        let word = &mut self.words_mut()[i / MASK_WORD_BITS];
        word.set(word.get() & !(1 << (i % MASK_WORD_BITS)));
    }

    pub fn clear_all(&mut self) {
        self.bytes.as_mut().fill(0);
    }

    /// Clears every bit with index `>= from`
    pub fn clear_from(&mut self, from: usize) {
        let words = self.words_mut();
        let first = from / MASK_WORD_BITS;
        if first >= words.len() {
            return;
        }
        let keep: MaskWord = (1 << (from % MASK_WORD_BITS)) - 1;
        let kept = words[first].get() & keep;
        words[first].set(kept);
        for word in &mut words[first + 1..] {
            word.set(0);
        }
    }
}

impl<B: AsRef<[u8]>> std::fmt::Debug for PresenceMask<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter_ones()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(mask_words(0), 0);
        assert_eq!(mask_words(1), 1);
        assert_eq!(mask_words(64), 1);
        assert_eq!(mask_words(65), 2);
        assert_eq!(mask_bytes(65), 16);
    }

    #[test]
    fn test_bit_layout() {
        let mut mask = PresenceMask::new(vec![0u8; 16]);
        mask.set(0);
        mask.set(9);
        mask.set(64);
        assert_eq!(mask.bytes, [1, 2, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(mask.get(9));
        assert!(!mask.get(10));
        assert_eq!(mask.count_ones(), 3);
        assert_eq!(mask.iter_ones().collect::<Vec<_>>(), [0, 9, 64]);
        assert_eq!(mask.last_one(), Some(64));
        mask.clear(64);
        assert_eq!(mask.last_one(), Some(9));
    }

    #[test]
    fn test_iter_ones_from() {
        let mut mask = PresenceMask::new(vec![0u8; 24]);
        for i in [3, 63, 64, 100, 191] {
            mask.set(i);
        }
        assert_eq!(mask.iter_ones_from(0).collect::<Vec<_>>(), [3, 63, 64, 100, 191]);
        assert_eq!(mask.iter_ones_from(4).collect::<Vec<_>>(), [63, 64, 100, 191]);
        assert_eq!(mask.iter_ones_from(64).collect::<Vec<_>>(), [64, 100, 191]);
        assert_eq!(mask.iter_ones_from(101).collect::<Vec<_>>(), [191]);
        assert_eq!(mask.iter_ones_from(192).count(), 0);
        assert_eq!(mask.iter_ones_from(1000).count(), 0);
        let bytes = mask.bytes.clone();
        let ones = PresenceMask::new(&bytes[..]).into_iter_ones_from(63);
        assert_eq!(ones.collect::<Vec<_>>(), [63, 64, 100, 191]);
    }

    #[test]
    fn test_clear_from() {
        let mut mask = PresenceMask::new(vec![0xffu8; 24]);
        mask.clear_from(70);
        assert_eq!(mask.count_ones(), 70);
        assert_eq!(mask.last_one(), Some(69));
        mask.clear_from(64);
        assert_eq!(mask.count_ones(), 64);
        mask.clear_from(200);
        assert_eq!(mask.count_ones(), 64);
        mask.clear_all();
        assert_eq!(mask.last_one(), None);
    }
}
