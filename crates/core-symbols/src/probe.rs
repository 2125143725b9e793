//! Co-prime linear-probe step, shared by the symbol table and by
//! `core-cell`'s MAP! hash table (spec 4.3/4.4 both specify the same
//! scheme).
//!
//! `table_len` must be prime so that any `step` in `1..table_len` is
//! automatically co-prime to it, guaranteeing a probe sequence visits
//! every slot exactly once before repeating.

/// `step = hash % (len - 1) + 1`.
pub fn step(hash: u64, table_len: usize) -> usize {
    debug_assert!(table_len > 1, "probe table must have at least 2 slots");
    (hash as usize % (table_len - 1)) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_is_always_in_range_and_nonzero() {
        for len in [5usize, 7, 11, 101, 1009] {
            for hash in [0u64, 1, 7, 999_999, u64::MAX] {
                let s = step(hash, len);
                assert!(s >= 1 && s < len);
            }
        }
    }

    #[test]
    fn full_probe_sequence_visits_every_slot_once() {
        let len = 11usize;
        let hash = 4u64;
        let s = step(hash, len);
        let mut seen = vec![false; len];
        let mut idx = hash as usize % len;
        for _ in 0..len {
            assert!(!seen[idx], "slot {idx} visited twice");
            seen[idx] = true;
            idx = (idx + s) % len;
        }
        assert!(seen.iter().all(|&b| b));
    }
}
