//! Partition assignment
//!
//! Maps a stream key (a message's `source`) to one of N topics. The hash is
//! 32-bit MurmurHash2 with a fixed seed, so every node in a fleet, on every
//! restart, picks the same topic for the same key. Changing the topic count
//! moves keys between topics.
//!
//! Bump `PARTITION_SCHEME_VERSION` if the hash, seed or reduction ever
//! changes; nodes running different versions route to different topics.

use murmur2::{KAFKA_SEED, murmur2};

pub const PARTITION_SCHEME_VERSION: u32 = 1;

/// Stable 32-bit hash of a stream key.
pub fn hash32(source: &str) -> u32 {
    murmur2(source.as_bytes(), KAFKA_SEED)
}

/// Topic index in `0..topic_count` for `source`.
///
/// `topic_count` must be positive.
pub fn topic_index(source: &str, topic_count: usize) -> usize {
    debug_assert!(topic_count > 0, "topic_count must be positive");
    // mask the sign bit so the reduction matches signed-hash implementations
    (hash32(source) & 0x7fff_ffff) as usize % topic_count
}

/// Names of the `topic_count` topics under `prefix`: `prefix_0`, `prefix_1`, ...
pub fn topic_names(prefix: &str, topic_count: usize) -> Vec<String> {
    (0..topic_count).map(|i| format!("{prefix}_{i}")).collect()
}
