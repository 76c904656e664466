//! Splitting bit patterns into 32-bit words
//!
//! Cross-lane reads move 32 bits at a time, so wider values travel as a
//! sequence of words. Word 0 holds the least significant bits. These
//! functions mirror, on plain integers, what the shuffle emitter builds in
//! IR with `zext`, a vector bitcast and `trunc`.

pub const WORD_BITS: u32 = 32;

/// Number of 32-bit words needed for `bit_width` bits
pub fn word_count(bit_width: u32) -> usize {
    bit_width.div_ceil(WORD_BITS) as usize
}

fn low_bits(bits: u128, bit_width: u32) -> u128 {
    if bit_width >= u128::BITS {
        bits
    } else {
        bits & ((1u128 << bit_width) - 1)
    }
}

/// Splits the low `bit_width` bits of `bits` into words, low word first
///
/// Bits above `bit_width` are dropped; the last word is zero-padded.
pub fn split_into_words(bits: u128, bit_width: u32) -> Vec<u32> {
    let bits = low_bits(bits, bit_width);
    (0..word_count(bit_width) as u32)
        .map(|i| bits.checked_shr(i * WORD_BITS).unwrap_or(0) as u32)
        .collect()
}

/// Inverse of [`split_into_words`]: reassembles words and truncates the
/// result to `bit_width` bits
pub fn join_words(words: &[u32], bit_width: u32) -> u128 {
    let bits = words.iter().enumerate().fold(0u128, |acc, (i, word)| {
        acc | u128::from(*word)
            .checked_shl(i as u32 * WORD_BITS)
            .unwrap_or(0)
    });
    low_bits(bits, bit_width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(0), 0);
        assert_eq!(word_count(1), 1);
        assert_eq!(word_count(32), 1);
        assert_eq!(word_count(33), 2);
        assert_eq!(word_count(64), 2);
        assert_eq!(word_count(128), 4);
    }

    #[test]
    fn test_low_word_first() {
        assert_eq!(
            split_into_words(0x1122_3344_5566_7788, 64),
            vec![0x5566_7788, 0x1122_3344]
        );
    }

    #[test]
    fn test_narrow_value_is_zero_extended() {
        assert_eq!(split_into_words(0xffff_ffff_ffff, 16), vec![0xffff]);
        assert_eq!(split_into_words(u128::MAX, 48), vec![0xffff_ffff, 0xffff]);
    }

    #[test]
    fn test_join_truncates() {
        assert_eq!(join_words(&[0xdead_beef, 0xffff_ffff], 40), 0xff_dead_beef);
    }

    proptest! {
        #[test]
        fn prop_split_then_join_preserves_bits(bits: u128, width in 1u32..=128) {
            let words = split_into_words(bits, width);
            prop_assert_eq!(words.len(), word_count(width));
            prop_assert_eq!(join_words(&words, width), low_bits(bits, width));
        }

        #[test]
        fn prop_last_word_padding_is_zero(bits: u128, width in 1u32..=128) {
            let words = split_into_words(bits, width);
            let used = width - (words.len() as u32 - 1) * WORD_BITS;
            if used < WORD_BITS {
                prop_assert_eq!(words[words.len() - 1] >> used, 0);
            }
        }
    }
}
