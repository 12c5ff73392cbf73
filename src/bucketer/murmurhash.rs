//! Deterministic MurmurHash3 32-bit hashing used by the bucketer (spec §4.1).

use murmur3::murmur3_32;

pub(crate) const HASH_SEED: u32 = 1;
pub(crate) const MAX_TRAFFIC_VALUE: u32 = 10_000;
const MAX_HASH_VALUE: f64 = 4_294_967_296.0; // 2^32

/// Hashes `input` with MurmurHash3 (x86, 32-bit) using `seed`, returning the
/// result reinterpreted as an unsigned 32-bit integer.
pub fn hash32(input: &str, seed: u32) -> u32 {
    let mut cursor = std::io::Cursor::new(input.as_bytes());
    // murmur3_32 only fails on I/O errors, which a Cursor over an in-memory
    // byte slice never produces.
    murmur3_32(&mut cursor, seed).expect("hashing an in-memory buffer cannot fail")
}

/// Maps a hash to a bucket value in the half-open interval `[0, 10000)`.
pub fn bucket_value(hash: u32) -> u32 {
    let ratio = f64::from(hash) / MAX_HASH_VALUE;
    (ratio * f64::from(MAX_TRAFFIC_VALUE)).floor() as u32
}

/// Computes the bucket value for `bucketing_id` hashed against `parent_id`,
/// per spec §4.1: hash input is `bucketing_id || parent_id`, seed 1.
pub fn generate_bucket_value(bucketing_id: &str, parent_id: &str) -> u32 {
    let combined = format!("{bucketing_id}{parent_id}");
    bucket_value(hash32(&combined, HASH_SEED))
}

#[cfg(test)]
mod murmurhash_tests;
