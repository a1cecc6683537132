//! Document-key hashing for shard routing
//!
//! Every document key hashes to a point in the `[0, 2^32)` hash space;
//! each shard of a database owns a half-open interval of that space.

/// Exclusive upper bound of the document-key hash space.
pub const HASH_SPACE_END: u64 = 1 << 32;

/// Hash a document key into the shard hash space.
pub fn key_hash(key: &str) -> u64 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key.as_bytes());
    hasher.finalize() as u64
}
