//! Stable hashing and the probe sequence of the shared table.
//!
//! Every process attached to a segment must agree on where a key lives, so the
//! hash is explicit (xxhash64, seed 0) and never std's randomized hasher.

use std::hash::Hasher;
use twox_hash::XxHash64;

/// 64-bit stable hash of the full key byte sequence.
#[inline]
pub fn hash64(key: &[u8]) -> u64 {
    let mut h = XxHash64::with_seed(0);
    h.write(key);
    h.finish()
}

/// Home slot of a key in a directory of `table_size` slots.
#[inline]
pub fn slot_index(key: &[u8], table_size: usize) -> usize {
    debug_assert!(table_size > 0, "table_size must be > 0");
    (hash64(key) % (table_size as u64)) as usize
}

/// Linear probing: started anywhere, `table_size` steps visit every slot once.
#[inline]
pub fn next_slot(idx: usize, table_size: usize) -> usize {
    let n = idx + 1;
    if n == table_size {
        0
    } else {
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hash_is_stable_across_calls() {
        assert_eq!(hash64(b"session:42"), hash64(b"session:42"));
        assert_ne!(hash64(b"a"), hash64(b"b"));
    }

    #[test]
    fn probe_sequence_covers_table() {
        for size in [1usize, 2, 7, 64, 256] {
            let mut seen = HashSet::new();
            let mut idx = slot_index(b"k", size);
            for _ in 0..size {
                seen.insert(idx);
                idx = next_slot(idx, size);
            }
            assert_eq!(seen.len(), size);
        }
    }
}
