//! STRATA - Compaction
//! Full-merge compaction: every segment is folded into a single run,
//! newest generation winning on key collisions, and tombstones whose
//! deletion is final are dropped for good.

use std::collections::BTreeMap;

use crate::types::{Key, Stored};

/// Counts describing one merge, for logging and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records read across all inputs.
    pub input_records: usize,
    /// Records in the merged output.
    pub live_records: usize,
    /// Keys whose final state was a tombstone.
    pub purged_tombstones: usize,
}

/// Merge segment contents into one sorted, tombstone-free run.
///
/// ## Algorithm
/// 1. Walk the runs oldest to newest
/// 2. Overwrite a working BTreeMap per key (later runs override earlier)
/// 3. Drop keys whose surviving slot is a tombstone
///
/// `runs` must be ordered by ascending generation.
pub fn merge_runs(runs: Vec<Vec<(Key, Stored)>>) -> (Vec<(Key, Stored)>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut merged = BTreeMap::new();

    for run in runs {
        stats.input_records += run.len();
        for (key, stored) in run {
            merged.insert(key, stored);
        }
    }

    let live: Vec<(Key, Stored)> = merged
        .into_iter()
        .filter(|(_, stored)| {
            if stored.is_tombstone() {
                stats.purged_tombstones += 1;
                false
            } else {
                true
            }
        })
        .collect();
    stats.live_records = live.len();

    (live, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn put(key: &str, value: i64) -> (Key, Stored) {
        (key.to_string(), Stored::Value(Value::Int(value)))
    }

    fn del(key: &str) -> (Key, Stored) {
        (key.to_string(), Stored::Tombstone)
    }

    #[test]
    fn test_merge_newest_wins() {
        let older = vec![put("a", 1), put("b", 2)];
        let newer = vec![put("a", 10), put("c", 3)];

        let (merged, stats) = merge_runs(vec![older, newer]);

        assert_eq!(merged, vec![put("a", 10), put("b", 2), put("c", 3)]);
        assert_eq!(stats.input_records, 4);
        assert_eq!(stats.live_records, 3);
        assert_eq!(stats.purged_tombstones, 0);
    }

    #[test]
    fn test_merge_drops_final_tombstones() {
        let older = vec![put("a", 1), put("b", 2)];
        let newer = vec![del("a"), put("c", 3)];

        let (merged, stats) = merge_runs(vec![older, newer]);

        // 'a' is filtered out (tombstone)
        assert_eq!(merged, vec![put("b", 2), put("c", 3)]);
        assert_eq!(stats.purged_tombstones, 1);
    }

    #[test]
    fn test_merge_write_after_delete_survives() {
        let runs = vec![vec![put("k", 1)], vec![del("k")], vec![put("k", 3)]];
        let (merged, _) = merge_runs(runs);
        assert_eq!(merged, vec![put("k", 3)]);
    }

    #[test]
    fn test_merge_everything_deleted() {
        let runs = vec![vec![put("x", 1)], vec![del("x"), del("y")]];
        let (merged, stats) = merge_runs(runs);
        assert!(merged.is_empty());
        assert_eq!(stats.purged_tombstones, 2);
    }
}
