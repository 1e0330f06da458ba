//! Packed lookup keys.
//!
//! A [`KeyBuilder`] accumulates small bit fields into a sequence of 32-bit
//! words. Fields are packed LSB-first into a 32-bit accumulator; when the
//! accumulator fills up the complete word is appended and the remaining high
//! bits of the field carry into the next word.
//!
//! A builder has no identity of its own. [`KeyBuilder::finish`] flushes the
//! partial word and yields an immutable [`StorageKey`], which is what caches
//! hash and compare.
//!
//! # Example
//!
//! ```ignore
//! let mut b = KeyBuilder::new();
//! b.add_bits(6, 0x2F, "class");
//! b.add_i32(-1, "flags");
//! let key = b.finish();
//! assert_eq!(key.len(), 2);
//! ```

use std::fmt;
use std::fmt::Write as _;

/// Immutable, flushed key: the raw word sequence of a [`KeyBuilder`].
///
/// Equality is word-by-word and order sensitive.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    words: Box<[u32]>,
}

impl StorageKey {
    /// Wrap an already packed word sequence.
    pub fn from_words(words: &[u32]) -> Self {
        Self {
            words: words.into(),
        }
    }

    /// The packed words.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Polynomial hash over the words: seed 1, multiplier 31, wrapping `i32`
    /// arithmetic.
    pub fn hash_code(&self) -> i32 {
        hash_words(&self.words)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey[")?;
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{word:#010x}")?;
        }
        write!(f, "]")
    }
}

/// Hash a word slice the way [`StorageKey::hash_code`] does.
pub fn hash_words(words: &[u32]) -> i32 {
    words
        .iter()
        .fold(1i32, |h, &w| h.wrapping_mul(31).wrapping_add(w as i32))
}

/// Append-only bit packer producing [`StorageKey`]s.
#[derive(Debug, Default, Clone)]
pub struct KeyBuilder {
    words: Vec<u32>,
    cur_value: u32,
    bits_used: u32,
    description: Option<String>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder that also records a readable `label: value` line for every
    /// field and comment. Recording has no effect on the packed words.
    pub fn with_description() -> Self {
        Self {
            description: Some(String::new()),
            ..Self::default()
        }
    }

    /// Append the low `num_bits` bits of `value`.
    ///
    /// # Panics
    ///
    /// Panics if `num_bits` is not in `1..=32` or `value` does not fit.
    pub fn add_bits(&mut self, num_bits: u32, value: u32, label: &str) {
        assert!(
            num_bits > 0 && num_bits <= 32,
            "bit count {num_bits} out of range"
        );
        assert!(
            num_bits == 32 || value >> num_bits == 0,
            "value {value:#x} does not fit in {num_bits} bits ({label})"
        );

        if let Some(desc) = self.description.as_mut() {
            let _ = writeln!(desc, "{label}: {value}");
        }

        self.cur_value |= value << self.bits_used;
        self.bits_used += num_bits;

        if self.bits_used >= 32 {
            self.words.push(self.cur_value);
            let excess = self.bits_used - 32;
            self.cur_value = if excess != 0 {
                value >> (num_bits - excess)
            } else {
                0
            };
            self.bits_used = excess;
        }
    }

    pub fn add_bool(&mut self, value: bool, label: &str) {
        self.add_bits(1, value as u32, label);
    }

    pub fn add_i32(&mut self, value: i32, label: &str) {
        self.add_bits(32, value as u32, label);
    }

    /// Record a comment line in the description, if one is kept.
    pub fn append_comment(&mut self, comment: &str) {
        if let Some(desc) = self.description.as_mut() {
            desc.push_str(comment);
            desc.push('\n');
        }
    }

    /// Introduce a word boundary, appending any partially filled word.
    pub fn flush(&mut self) {
        if self.bits_used != 0 {
            self.words.push(self.cur_value);
            self.cur_value = 0;
            self.bits_used = 0;
        }
    }

    /// Complete words appended so far. Excludes a pending partial word.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Bits waiting in the accumulator.
    pub fn pending_bits(&self) -> u32 {
        self.bits_used
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Flush and produce the finished key, leaving the builder empty for reuse.
    pub fn finish(&mut self) -> StorageKey {
        self.flush();
        let key = StorageKey::from_words(&self.words);
        self.clear();
        key
    }

    /// Reset to an empty builder. Keeps allocated storage.
    pub fn clear(&mut self) {
        self.words.clear();
        self.cur_value = 0;
        self.bits_used = 0;
        if let Some(desc) = self.description.as_mut() {
            desc.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_across_word_boundary() {
        let mut b = KeyBuilder::new();
        b.add_bits(6, 0x2F, "a");
        b.add_bits(32, 0xC111_1111, "b");
        let key = b.finish();
        // low word: 0x2F | (0xC1111111 << 6), high word: remaining 6 bits
        assert_eq!(key.words(), &[0x4444_446F, 0x30]);
    }

    #[test]
    fn test_exact_word_fill() {
        let mut b = KeyBuilder::new();
        b.add_bits(16, 0xBEEF, "lo");
        b.add_bits(16, 0xDEAD, "hi");
        assert_eq!(b.words(), &[0xDEAD_BEEF]);
        assert_eq!(b.pending_bits(), 0);
        assert_eq!(b.finish().words(), &[0xDEAD_BEEF]);
    }

    #[test]
    fn test_lsb_first_packing_matches_reference() {
        let fields: &[(u32, u32)] = &[
            (3, 5),
            (7, 100),
            (1, 1),
            (21, 0x1F_FFFF),
            (32, 7),
            (2, 3),
            (30, 12345),
        ];
        let mut b = KeyBuilder::new();
        for &(bits, value) in fields {
            b.add_bits(bits, value, "f");
        }
        let key = b.finish();

        // Reference packing through a wide accumulator.
        let mut expected = Vec::new();
        let mut acc: u128 = 0;
        let mut used = 0u32;
        for &(bits, value) in fields {
            acc |= (value as u128) << used;
            used += bits;
            while used >= 32 {
                expected.push(acc as u32);
                acc >>= 32;
                used -= 32;
            }
        }
        assert_eq!(used, 0);
        assert_eq!(key.words(), expected.as_slice());
    }

    #[test]
    fn test_flush_inserts_boundary() {
        let mut b = KeyBuilder::new();
        b.add_bool(true, "x");
        b.flush();
        b.add_bool(true, "y");
        assert_eq!(b.finish().words(), &[1, 1]);
    }

    #[test]
    fn test_hash_code_matches_polynomial() {
        let key = StorageKey::from_words(&[1, 2, 3]);
        // ((1 * 31 + 1) * 31 + 2) * 31 + 3
        assert_eq!(key.hash_code(), 30817);
        assert_eq!(StorageKey::from_words(&[]).hash_code(), 1);
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = StorageKey::from_words(&[1, 2]);
        let b = StorageKey::from_words(&[2, 1]);
        assert_ne!(a, b);
        assert_eq!(a, StorageKey::from_words(&[1, 2]));
        assert_eq!(a.hash_code(), hash_words(&[1, 2]));
    }

    #[test]
    fn test_hash_wraps() {
        // every word reads as -1; 31 * h - 1 overflows i32 from the seventh word
        let key = StorageKey::from_words(&[u32::MAX; 8]);
        assert_eq!(key.hash_code(), -172_384_639);
        assert_eq!(StorageKey::from_words(&[u32::MAX; 4]).hash_code(), 892_737);
    }

    #[test]
    fn test_description_records_fields() {
        let mut b = KeyBuilder::with_description();
        b.append_comment("pipeline");
        b.add_bits(4, 9, "format");
        b.add_i32(-1, "flags");
        assert_eq!(
            b.description(),
            Some("pipeline\nformat: 9\nflags: 4294967295\n")
        );
        let described = b.finish();

        let mut plain = KeyBuilder::new();
        plain.add_bits(4, 9, "format");
        plain.add_i32(-1, "flags");
        assert_eq!(described, plain.finish());
    }

    #[test]
    #[should_panic]
    fn test_value_must_fit() {
        KeyBuilder::new().add_bits(3, 8, "too wide");
    }

    #[test]
    #[should_panic]
    fn test_zero_bits_rejected() {
        KeyBuilder::new().add_bits(0, 0, "empty");
    }
}
