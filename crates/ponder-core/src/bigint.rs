//! Fixed-width decimal encoding for 256-bit integers.
//!
//! `value`, EIP-1559 fee fields, and other uint256 quantities are carried
//! as decimal strings rather than a native `u256` type — none of the
//! teacher's dependencies provide one, and a 79-character zero-padded
//! decimal string sorts byte-lexicographically in the same order as the
//! numeric value, which is what the sync store's SQLite/Postgres indexes
//! rely on. No arithmetic is performed on these values by the engine; a
//! host-side ABI decoder produces and consumes them.

use crate::error::PonderError;

/// `2^256 - 1` has 78 decimal digits; one extra digit of headroom matches
/// the spec's stated default width.
pub const WIDTH: usize = 79;

/// Zero-pad a decimal digit string to [`WIDTH`] characters.
///
/// `value` must be a non-negative base-10 integer with no sign, leading
/// `+`, or separators.
pub fn encode_decimal(value: &str) -> Result<String, PonderError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PonderError::Other(format!(
            "invalid decimal integer: {value:?}"
        )));
    }
    if value.len() > WIDTH {
        return Err(PonderError::Other(format!(
            "decimal integer exceeds {WIDTH} digits: {value:?}"
        )));
    }
    Ok(format!("{value:0>WIDTH$}"))
}

/// Decode a [`WIDTH`]-character zero-padded decimal string back to its
/// canonical (no leading zeros, but never empty) form.
pub fn decode_decimal(encoded: &str) -> Result<String, PonderError> {
    if encoded.len() != WIDTH || !encoded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PonderError::Other(format!(
            "invalid encoded decimal integer: {encoded:?}"
        )));
    }
    let trimmed = encoded.trim_start_matches('0');
    Ok(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}
