//! Bit-packed k-mer values.
//!
//! A [`Kmer`] is a fixed-width array of 64-bit words holding 2-bit
//! *pieces*. Piece 0 carries the flag bits (first-base-known and
//! color-space); pieces `1..=k` carry symbol codes: base codes in base
//! space, or a first-base anchor followed by `k - 1` color codes in color
//! space. Unused pieces are always zero, so values of the same width are
//! directly comparable word by word.
//!
//! Reverse complement is bit-parallel over whole words. In color space the
//! color run is order-reversed (colors are strand-symmetric) and the new
//! anchor is recovered from an XOR fold of the colors, so no per-symbol
//! walk is needed there either.

use crate::codec;
use std::cmp::Ordering;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Widest supported k-mer. One flag piece plus up to 63 symbol pieces fit
/// exactly in two 64-bit words.
pub const MAX_KMER_LENGTH: usize = 63;

/// Number of 64-bit words backing one k-mer; also the wire size in words.
pub const KMER_WORDS: usize = (2 * (MAX_KMER_LENGTH + 1)).div_ceil(64);

// The word<->u128 conversions below assume exactly two words.
const _: () = assert!(KMER_WORDS == 2);

const FLAG_FIRST_BASE_KNOWN: u128 = 0b01;
const FLAG_COLOR_SPACE: u128 = 0b10;
const FLAG_BITS: u128 = 0b11;

/// Seed for the rank-sharding hash.
const HASH_SEED_PRIMARY: u64 = 0x9747_b28c_ab4f_8e4d;
/// Seed for the in-table double-hashing step.
const HASH_SEED_SECONDARY: u64 = 0x2545_f491_4f6c_dd1d;

const LANE_PAIR_MASK: u128 = 0x3333_3333_3333_3333_3333_3333_3333_3333;
const LANE_NIBBLE_MASK: u128 = 0x0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F;

/// Which strand of the source text a window is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

/// Errors produced while building a k-mer from read text.
///
/// These are ordinary data conditions, reported as values so they can
/// cross rank boundaries without unwinding; the caller skips the window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmerError {
    /// The requested window does not fit inside the read.
    #[error("window [{pos}, {pos}+{word_size}) exceeds read of length {read_length}")]
    WindowOutOfBounds { pos: usize, word_size: usize, read_length: usize },

    /// The requested width is zero or above [`MAX_KMER_LENGTH`].
    #[error("word size {word_size} outside supported range 1..={MAX_KMER_LENGTH}")]
    UnsupportedWordSize { word_size: usize },

    /// A symbol that must be a definite base or color is neither.
    #[error("invalid symbol '{symbol}' at window offset {offset}")]
    InvalidSymbol { offset: usize, symbol: char },
}

/// A fixed-width, bit-packed k-mer value.
///
/// Plain value type: freely copied, never shared across ranks by
/// reference: peers exchange the raw words via [`Kmer::pack_into`] and
/// [`Kmer::unpack_from`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Kmer {
    words: [u64; KMER_WORDS],
}

/// Mask covering `n` 2-bit lanes at the low end of a value.
#[inline]
const fn lanes_mask(n: usize) -> u128 {
    if n == 0 { 0 } else { (1u128 << (2 * n)) - 1 }
}

/// Reverse the order of the `n` low 2-bit lanes of `x`.
#[inline]
fn reverse_lanes(mut x: u128, n: usize) -> u128 {
    if n == 0 {
        return 0;
    }
    x = ((x >> 2) & LANE_PAIR_MASK) | ((x & LANE_PAIR_MASK) << 2);
    x = ((x >> 4) & LANE_NIBBLE_MASK) | ((x & LANE_NIBBLE_MASK) << 4);
    x = x.swap_bytes();
    x >> (128 - 2 * n)
}

/// XOR-fold all 2-bit lanes of `x` into one lane.
#[inline]
fn xor_fold_lanes(mut x: u128) -> u8 {
    x ^= x >> 64;
    x ^= x >> 32;
    x ^= x >> 16;
    x ^= x >> 8;
    x ^= x >> 4;
    x ^= x >> 2;
    (x & 0b11) as u8
}

impl Kmer {
    /// Build a k-mer from a window of read text.
    ///
    /// The window `text[pos..pos + word_size]` must hold definite symbols:
    /// bases in base space, or an anchor plus colors in color space. A
    /// color-space window whose leading symbol is ambiguous (`N` or `.`)
    /// is still accepted: the value carries an explicit unknown-first-base
    /// flag instead of a guessed anchor. Any other out-of-alphabet symbol
    /// fails the window.
    pub fn from_sequence(
        text: &[u8],
        pos: usize,
        word_size: usize,
        strand: Strand,
    ) -> Result<Kmer, KmerError> {
        if word_size == 0 || word_size > MAX_KMER_LENGTH {
            return Err(KmerError::UnsupportedWordSize { word_size });
        }
        if pos + word_size > text.len() {
            return Err(KmerError::WindowOutOfBounds {
                pos,
                word_size,
                read_length: text.len(),
            });
        }
        let window = &text[pos..pos + word_size];
        let color_space = codec::is_color_space(window);

        let mut value: u128 = if color_space { FLAG_COLOR_SPACE } else { 0 };
        match codec::encode_symbol(window[0]) {
            Some(code) => {
                value |= FLAG_FIRST_BASE_KNOWN;
                value |= u128::from(code) << 2;
            }
            None if color_space && matches!(window[0], b'N' | b'n' | b'.') => {
                // Anchor unrecoverable; the flag carries that state.
            }
            None => {
                return Err(KmerError::InvalidSymbol {
                    offset: 0,
                    symbol: window[0] as char,
                });
            }
        }
        for (offset, &symbol) in window.iter().enumerate().skip(1) {
            let code = codec::encode_symbol(symbol).ok_or(KmerError::InvalidSymbol {
                offset,
                symbol: symbol as char,
            })?;
            value |= u128::from(code) << (2 * (offset + 1));
        }

        let kmer = Kmer::from_value(value);
        Ok(match strand {
            Strand::Forward => kmer,
            Strand::Reverse => kmer.reverse_complement(word_size),
        })
    }

    #[inline]
    fn from_value(value: u128) -> Kmer {
        Kmer { words: [value as u64, (value >> 64) as u64] }
    }

    #[inline]
    fn value(&self) -> u128 {
        u128::from(self.words[0]) | (u128::from(self.words[1]) << 64)
    }

    /// The 2-bit piece at `index` (piece 0 is the flag piece).
    #[inline]
    #[must_use]
    pub fn piece(&self, index: usize) -> u8 {
        debug_assert!(index <= MAX_KMER_LENGTH);
        ((self.words[index / 32] >> ((index % 32) * 2)) & 0b11) as u8
    }

    /// Whether this value is in color space.
    #[inline]
    #[must_use]
    pub fn is_color_space(&self) -> bool {
        self.value() & FLAG_COLOR_SPACE != 0
    }

    /// Whether the first base is known (always true in base space).
    #[inline]
    #[must_use]
    pub fn first_base_known(&self) -> bool {
        self.value() & FLAG_FIRST_BASE_KNOWN != 0
    }

    /// Code of the first symbol (piece 1): a base, or the anchor in color
    /// space.
    #[inline]
    #[must_use]
    pub fn first_symbol_code(&self) -> u8 {
        self.piece(1)
    }

    /// Code of the last symbol of a width-`word_size` value.
    #[inline]
    #[must_use]
    pub fn last_symbol_code(&self, word_size: usize) -> u8 {
        self.piece(word_size)
    }

    /// Symbol-wise complement, order-reversed.
    ///
    /// Bit-parallel over the packed words. In color space the colors are
    /// reversed as-is (the transition between two bases reads the same on
    /// both strands) and the new anchor is the complement of the decoded
    /// last base, recovered with an XOR fold.
    #[must_use]
    pub fn reverse_complement(&self, word_size: usize) -> Kmer {
        let value = self.value();
        let sequence = value >> 2;
        if !self.is_color_space() {
            let complemented = !sequence & lanes_mask(word_size);
            let reversed = reverse_lanes(complemented, word_size);
            return Kmer::from_value((reversed << 2) | (value & FLAG_BITS));
        }

        let colors = (sequence >> 2) & lanes_mask(word_size.saturating_sub(1));
        let reversed = reverse_lanes(colors, word_size.saturating_sub(1));
        let mut out = FLAG_COLOR_SPACE | (reversed << 4);
        if self.first_base_known() {
            let last_base = self.piece(1) ^ xor_fold_lanes(colors);
            let anchor = codec::complement_code(last_base);
            out |= FLAG_FIRST_BASE_KNOWN | (u128::from(anchor) << 2);
        }
        Kmer::from_value(out)
    }

    /// The canonical form: the smaller of this value and its reverse
    /// complement under [`Kmer::compare`].
    #[must_use]
    pub fn canonical(&self, word_size: usize) -> Kmer {
        let rc = self.reverse_complement(word_size);
        if self.compare(&rc) == Ordering::Greater { rc } else { *self }
    }

    /// Whether this value already is its own canonical form.
    #[must_use]
    pub fn is_canonical(&self, word_size: usize) -> bool {
        self.compare(&self.reverse_complement(word_size)) != Ordering::Greater
    }

    /// Total order over the packed pieces, most-significant word first.
    ///
    /// Flag bits never participate. The first symbol participates only
    /// when both operands know their first base; otherwise a difference
    /// confined to an unresolvable anchor must not order the values apart.
    #[must_use]
    pub fn compare(&self, other: &Kmer) -> Ordering {
        let ignore_first = !(self.first_base_known() && other.first_base_known());
        let mut low_mask = !(FLAG_BITS as u64);
        if ignore_first {
            low_mask &= !0b1100;
        }
        for index in (0..KMER_WORDS).rev() {
            let mut a = self.words[index];
            let mut b = other.words[index];
            if index == 0 {
                a &= low_mask;
                b &= low_mask;
            }
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }

    #[inline]
    fn hashed_words(&self) -> [u64; KMER_WORDS] {
        let mut words = self.words;
        words[0] &= !(FLAG_BITS as u64);
        words
    }

    /// Uniform hash used for rank sharding. Flag bits do not perturb it.
    #[must_use]
    pub fn hash_primary(&self) -> u64 {
        let mut bytes = [0u8; KMER_WORDS * 8];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(self.hashed_words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        xxh3_64_with_seed(&bytes, HASH_SEED_PRIMARY)
    }

    /// Independent second hash, used as the double-hashing probe step.
    #[must_use]
    pub fn hash_secondary(&self) -> u64 {
        let mut bytes = [0u8; KMER_WORDS * 8];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(self.hashed_words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        xxh3_64_with_seed(&bytes, HASH_SEED_SECONDARY)
    }

    /// The rank owning this k-mer: the primary hash of the canonical form
    /// modulo the world size. Both orientations map to the same owner.
    #[must_use]
    pub fn owner_rank(&self, word_size: usize, world_size: u16) -> u16 {
        (self.canonical(word_size).hash_primary() % u64::from(world_size)) as u16
    }

    /// Extend to the predecessor k-mers selected by the 4-bit `mask`:
    /// one value per set bit, in ascending symbol code.
    #[must_use]
    pub fn extend_ingoing(&self, mask: u8, word_size: usize) -> Vec<Kmer> {
        let value = self.value();
        let flags = value & FLAG_BITS;
        let sequence = value >> 2;
        let mut out = Vec::with_capacity((mask & 0xF).count_ones() as usize);
        for symbol in 0..4u8 {
            if mask & (1 << symbol) == 0 {
                continue;
            }
            let extended = if !self.is_color_space() {
                let shifted = (sequence << 2) & lanes_mask(word_size);
                shifted | u128::from(symbol)
            } else {
                // Prepending color c moves the anchor one base backwards.
                let kept = (sequence >> 2) & lanes_mask(word_size.saturating_sub(2));
                let anchor = if self.first_base_known() {
                    u128::from(self.piece(1) ^ symbol)
                } else {
                    0
                };
                anchor | (u128::from(symbol) << 2) | (kept << 4)
            };
            out.push(Kmer::from_value((extended << 2) | flags));
        }
        out
    }

    /// Extend to the successor k-mers selected by the 4-bit `mask`:
    /// one value per set bit, in ascending symbol code.
    #[must_use]
    pub fn extend_outgoing(&self, mask: u8, word_size: usize) -> Vec<Kmer> {
        let value = self.value();
        let flags = value & FLAG_BITS;
        let sequence = value >> 2;
        let mut out = Vec::with_capacity((mask & 0xF).count_ones() as usize);
        for symbol in 0..4u8 {
            if mask & (1 << symbol) == 0 {
                continue;
            }
            let extended = if !self.is_color_space() {
                let shifted = (sequence >> 2) & lanes_mask(word_size - 1);
                shifted | (u128::from(symbol) << (2 * (word_size - 1)))
            } else {
                // Dropping the first base advances the anchor one color.
                let kept = (sequence >> 4) & lanes_mask(word_size.saturating_sub(2));
                let anchor = if self.first_base_known() {
                    u128::from(self.piece(1) ^ self.piece(2))
                } else {
                    0
                };
                anchor | (kept << 2) | (u128::from(symbol) << (2 * (word_size - 1)))
            };
            out.push(Kmer::from_value((extended << 2) | flags));
        }
        out
    }

    /// Append the raw words to a wire buffer.
    pub fn pack_into(&self, buffer: &mut Vec<u64>) {
        buffer.extend_from_slice(&self.words);
    }

    /// Rebuild a value from [`KMER_WORDS`] wire words.
    #[must_use]
    pub fn unpack_from(words: &[u64]) -> Kmer {
        let mut kmer = Kmer::default();
        kmer.words.copy_from_slice(&words[..KMER_WORDS]);
        kmer
    }

    /// Render in the value's native space: base characters, or an anchor
    /// character (`N` when unknown) followed by color digits.
    #[must_use]
    pub fn render(&self, word_size: usize) -> String {
        let mut out = String::with_capacity(word_size);
        if !self.is_color_space() {
            for index in 1..=word_size {
                out.push(codec::decode_base(self.piece(index)) as char);
            }
            return out;
        }
        if self.first_base_known() {
            out.push(codec::decode_base(self.piece(1)) as char);
        } else {
            out.push('N');
        }
        for index in 2..=word_size {
            out.push(codec::decode_color(self.piece(index)) as char);
        }
        out
    }

    /// Render decoded to base space. A color-space value with an unknown
    /// anchor decodes to all `N`: without the anchor no base is definite.
    #[must_use]
    pub fn to_base_string(&self, word_size: usize) -> String {
        if !self.is_color_space() {
            return self.render(word_size);
        }
        if !self.first_base_known() {
            return "N".repeat(word_size);
        }
        let mut out = String::with_capacity(word_size);
        let mut base = self.piece(1);
        out.push(codec::decode_base(base) as char);
        for index in 2..=word_size {
            base = codec::apply_color(base, self.piece(index));
            out.push(codec::decode_base(base) as char);
        }
        out
    }
}

impl PartialEq for Kmer {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Kmer {}

impl PartialOrd for Kmer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Kmer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}
