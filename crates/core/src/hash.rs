//! Hash functions for set elements and map keys
//!
//! Hashes are 32-bit. Strings use FNV-1a, composite values fold their
//! parts together with [`hash_combine`].

/// FNV-1a 32-bit hash (compile-time capable)
pub const fn fnv1a_32(data: &[u8]) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;

    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < data.len() {
        hash ^= data[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Hash a string at runtime
#[inline]
pub fn hash_str(s: &str) -> u32 {
    fnv1a_32(s.as_bytes())
}

/// Hash a 64-bit value by folding the high word into the low word
#[inline]
pub const fn hash_u64(value: u64) -> u32 {
    (value as u32).wrapping_add(((value >> 32) as u32).wrapping_mul(23))
}

/// Fold `next` into an accumulated hash
#[inline]
pub const fn hash_combine(seed: u32, next: u32) -> u32 {
    seed ^ next
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}
