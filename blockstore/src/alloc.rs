use crate::BlockId;
use std::ops::Range;
use zerocopy::AsBytes;

const WORD_BITS: usize = 64;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum State {
    Free,
    Used,
}

/// A fixed length occupancy map holding one bit per block. Bits are packed
/// into 64-bit words, bit `i` lives at position `i % 64` of word `i / 64`.
/// Bits past `len` in the final word are always zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

fn words_for(bits: usize) -> usize {
    bits / WORD_BITS + (bits % WORD_BITS != 0) as usize
}

/// Bytes of word storage a bitmap of `bits` bits allocates.
pub(crate) fn image_len(bits: usize) -> usize {
    words_for(bits) * std::mem::size_of::<u64>()
}

impl Bitmap {
    /// Creates an all clear bitmap of `len` bits. Returns `None` if the word
    /// storage cannot be allocated.
    pub fn create(len: usize) -> Option<Self> {
        let nwords = words_for(len);
        let mut words = Vec::new();
        words.try_reserve_exact(nwords).ok()?;
        words.resize(nwords, 0);
        Some(Self { words, len })
    }

    /// Rebuilds a bitmap of `len` bits from an image produced by
    /// [`Bitmap::as_bytes`]. Extra trailing bytes in `buf` are ignored, a
    /// buffer shorter than the image yields `None`.
    pub fn from_bytes(len: usize, buf: &[u8]) -> Option<Self> {
        let mut bmp = Self::create(len)?;
        let image = bmp.words.as_mut_slice().as_bytes_mut();
        if buf.len() < image.len() {
            return None;
        }
        let image_len = image.len();
        image.copy_from_slice(&buf[..image_len]);
        bmp.clear_tail();
        Some(bmp)
    }

    /// The raw image of the bitmap, native-endian 64-bit words.
    pub fn as_bytes(&self) -> &[u8] {
        self.words.as_slice().as_bytes()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, bit: usize) -> State {
        if self.test(bit) {
            State::Used
        } else {
            State::Free
        }
    }

    pub fn test(&self, bit: usize) -> bool {
        assert!(bit < self.len, "bit {} out of bitmap range {}", bit, self.len);
        let mask = 1_u64 << (bit % WORD_BITS);
        self.words[bit / WORD_BITS] & mask != 0
    }

    pub fn set(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {} out of bitmap range {}", bit, self.len);
        self.words[bit / WORD_BITS] |= 1_u64 << (bit % WORD_BITS);
    }

    pub fn reset(&mut self, bit: usize) {
        assert!(bit < self.len, "bit {} out of bitmap range {}", bit, self.len);
        self.words[bit / WORD_BITS] &= !(1_u64 << (bit % WORD_BITS));
    }

    pub fn count_set(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn clear_tail(&mut self) {
        let used = self.len % WORD_BITS;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1_u64 << used) - 1;
            }
        }
    }
}

/// Lowest-id-first allocation policy. Yields every clear bit in ascending
/// order, jumping over the `skip` range when one is given. The iterator only
/// observes the bitmap, callers mark the ids they take.
pub struct FirstFit<'a> {
    /// The next id to inspect.
    marker: BlockId,
    bitmap: &'a Bitmap,
    skip: Option<Range<BlockId>>,
}

impl<'a> FirstFit<'a> {
    pub fn new(bitmap: &'a Bitmap, skip: Option<Range<BlockId>>) -> Self {
        Self {
            marker: 0,
            bitmap,
            skip,
        }
    }
}

impl<'a> Iterator for FirstFit<'a> {
    type Item = BlockId;

    fn next(&mut self) -> Option<Self::Item> {
        while self.marker < self.bitmap.len() {
            let id = self.marker;
            if let Some(skip) = &self.skip {
                if skip.contains(&id) {
                    self.marker = skip.end;
                    continue;
                }
            }
            self.marker += 1;
            if let State::Free = self.bitmap.get(id) {
                return Some(id);
            }
        }
        None
    }
}
