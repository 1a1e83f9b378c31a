//! Key hashing
//!
//! A file's logical name is hashed once with xxh3 and the same 64-bit value
//! is used for placement, splitting, recovery and bucket ordering.

use xxhash_rust::xxh3::xxh3_64;

/// Fixed-width hash of a logical file name
pub type KeyHash = i64;

/// Hash a logical file name
pub fn key_hash(key: &str) -> KeyHash {
    xxh3_64(key.as_bytes()) as i64
}

/// Directory slot for `hash` when the directory uses `depth` low-order bits
pub fn position_in_directory(hash: KeyHash, depth: u32) -> usize {
    (hash as u64 & low_bits_mask(depth)) as usize
}

/// Mask selecting the low `depth` bits
pub fn low_bits_mask(depth: u32) -> u64 {
    if depth >= 64 {
        u64::MAX
    } else {
        (1u64 << depth) - 1
    }
}
