//! Exact bit-cost model for the ZX0 wire format.
//!
//! All sizes are in bits. The parser and the command reducer both price
//! candidate parses with these functions, and the emitter produces streams
//! whose length matches them exactly, so any disagreement here corrupts
//! output rather than merely mis-costing it.

use crate::MIN_ENCODED_MATCH_SIZE;

/// Size of a command-kind token.
pub(crate) const TOKEN_SIZE: u32 = 1;

/// Bit length of the interlaced Elias-gamma code for `value` (>= 1).
///
/// One (0, bit) pair per mantissa bit below the MSB, plus the terminating 1.
#[inline]
pub(crate) fn elias_gamma_bits(value: u32) -> u32 {
    debug_assert!(value >= 1);
    2 * (31 - value.leading_zeros()) + 1
}

/// Bit length of a literal-run command of `run_len` bytes, excluding the
/// byte-aligned literal payload.
#[inline]
pub(crate) fn literal_run_bits(run_len: u32) -> u32 {
    if run_len == 0 {
        0
    } else {
        TOKEN_SIZE + elias_gamma_bits(run_len)
    }
}

/// Bit length of the offset part of a with-offset match command.
///
/// Seven bits for the low byte plus the Elias code of the high part;
/// offsets up to 128 therefore cost exactly 8 bits.
#[inline]
pub(crate) fn offset_bits(offset: u32) -> u32 {
    debug_assert!(offset >= 1);
    7 + elias_gamma_bits(((offset - 1) >> 7) + 1)
}

/// Bit length of the length part of a match command of `len` bytes.
///
/// With `k = len - MIN_ENCODED_MATCH_SIZE`, a with-offset match encodes
/// `k + 1` and a rep-match encodes `k + 2`.
#[inline]
pub(crate) fn match_len_bits(len: u32, is_rep: bool) -> u32 {
    debug_assert!(len >= MIN_ENCODED_MATCH_SIZE as u32);
    let k = len - MIN_ENCODED_MATCH_SIZE as u32;
    if is_rep {
        elias_gamma_bits(k + 2)
    } else {
        elias_gamma_bits(k + 1)
    }
}

/// Full bit cost of a match command (token, offset when explicit, length).
#[inline]
pub(crate) fn match_command_bits(offset: u32, len: u32, is_rep: bool) -> u32 {
    if is_rep {
        TOKEN_SIZE + match_len_bits(len, true)
    } else {
        TOKEN_SIZE + offset_bits(offset) + match_len_bits(len, false)
    }
}
