//! Helper functions for hashing and slot handles

use crate::constants::JHASH_INITVAL;

#[inline(always)]
fn jhash_final(mut a: u32, mut b: u32, mut c: u32) -> u32 {
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(14));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(11));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(25));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(16));
    a ^= c;
    a = a.wrapping_sub(c.rotate_left(4));
    b ^= a;
    b = b.wrapping_sub(a.rotate_left(14));
    c ^= b;
    c = c.wrapping_sub(b.rotate_left(24));
    c
}

/// Bob Jenkins' one-word hash (lookup3 final mix), keyed by `seed`.
#[inline]
pub fn jhash_1word(word: u32, seed: u32) -> u32 {
    let init = seed
        .wrapping_add(JHASH_INITVAL)
        .wrapping_add(1 << 2);
    jhash_final(word.wrapping_add(init), init, init)
}

// Packs a slot index and generation into a single u64 for ABA-safe handles.
#[inline]
pub fn pack(index: u32, gen: u32) -> u64 {
    ((gen as u64) << 32) | (index as u64)
}

#[inline]
pub fn unpack(packed: u64) -> (u32, u32) {
    (packed as u32, (packed >> 32) as u32)
}
