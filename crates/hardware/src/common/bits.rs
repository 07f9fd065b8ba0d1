//! Integer and bit helpers shared by the execution units.

/// Ceiling division for non-negative sizes. A zero divisor yields zero.
#[inline]
pub const fn div_ceil(value: usize, divisor: usize) -> usize {
    if divisor == 0 {
        0
    } else {
        value.div_ceil(divisor)
    }
}

/// Returns whether bit `index` of a little-endian bit mask is set.
///
/// Bits beyond the end of `mask` read as clear.
#[inline]
pub fn mask_bit(mask: &[u8], index: usize) -> bool {
    mask.get(index / 8).is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

/// Counts set bits among the first `len` bits of `mask`.
pub fn count_mask_bits(mask: &[u8], len: usize) -> usize {
    (0..len).filter(|&i| mask_bit(mask, i)).count()
}

/// Encodes a register word as little-endian bytes.
#[inline]
pub const fn word_to_bytes(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Decodes a little-endian word. Missing trailing bytes read as zero.
pub fn bytes_to_word(bytes: &[u8]) -> i32 {
    let mut word = [0u8; 4];
    for (dst, src) in word.iter_mut().zip(bytes) {
        *dst = *src;
    }
    i32::from_le_bytes(word)
}

/// Unpacks `count` little-endian values of `bit_width` bits each from `bytes`.
///
/// Values are packed back to back starting at bit 0; bits past the end of the
/// buffer read as zero. Widths above 64 are clamped to 64.
pub fn unpack_values(bytes: &[u8], bit_width: usize, count: usize) -> Vec<u64> {
    let width = bit_width.clamp(1, 64);
    (0..count)
        .map(|n| {
            let base = n * width;
            (0..width).fold(0u64, |acc, bit| {
                if mask_bit(bytes, base + bit) {
                    acc | (1 << bit)
                } else {
                    acc
                }
            })
        })
        .collect()
}
