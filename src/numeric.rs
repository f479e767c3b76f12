//! Fixed width big-endian numbers embedded in the tail of fixed length keys.
//!
//! A key of a dense node is split into three parts:
//! `[prefix | middle | numeric part]`. The prefix is shared by the node fences
//! and not stored, the middle bytes must match the lower fence and the numeric
//! part (up to 4 bytes) selects the slot.

pub type NumericPart = u32;

pub const MAX_NUMERIC_PART_LEN: usize = size_of::<NumericPart>();

/// Length of the numeric part of keys with `full_key_len` bytes in a node with `prefix_len`
#[inline]
pub fn numeric_part_len(prefix_len: usize, full_key_len: usize) -> usize {
    MAX_NUMERIC_PART_LEN.min(full_key_len - prefix_len)
}

/// Length of everything that comes before the numeric part (prefix and middle bytes)
#[inline]
pub fn numeric_prefix_len(prefix_len: usize, full_key_len: usize) -> usize {
    full_key_len - numeric_part_len(prefix_len, full_key_len)
}

/// Reads the trailing (up to 4) bytes of `bytes` as a big-endian number.
///
/// Panics if `bytes` is empty.
pub fn read_numeric(bytes: &[u8]) -> NumericPart {
    match *bytes {
        [] => panic!("zero length numeric part"),
        [b0] => b0 as NumericPart,
        [b0, b1] => u16::from_be_bytes([b0, b1]) as NumericPart,
        [b0, b1, b2] => NumericPart::from_be_bytes([0, b0, b1, b2]),
        [.., b0, b1, b2, b3] => NumericPart::from_be_bytes([b0, b1, b2, b3]),
    }
}

/// Writes the low `dst.len()` bytes of the big-endian representation of `value`.
pub fn write_numeric(value: NumericPart, dst: &mut [u8]) {
    debug_assert!(dst.len() <= MAX_NUMERIC_PART_LEN);
    let be = value.to_be_bytes();
    dst.copy_from_slice(&be[MAX_NUMERIC_PART_LEN - dst.len()..]);
}
