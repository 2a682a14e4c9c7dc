//! STRATA - Storage Engine Module
//! Top-level module for the LSM-Tree storage engine components.

pub mod compaction;
pub mod concurrent;
pub mod memtable;
pub mod metrics;
pub mod segment;

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::types::{Key, Lookup, Value, MAX_NESTING_DEPTH};

use self::compaction::merge_runs;
use self::memtable::MemTable;
use self::metrics::EngineMetrics;
use self::segment::{
    parse_generation, sync_dir, Segment, DATA_SUFFIX, INDEX_SUFFIX, TMP_SUFFIX,
};

/// The core Strata storage engine.
/// Coordinates the MemTable and the on-disk segments to provide a
/// persistent key-value store based on LSM-Tree architecture.
///
/// The engine is single-owner: every method runs to completion on the
/// caller's thread. Wrap it in [`concurrent::SharedStrata`] to share it.
pub struct Strata {
    /// In-memory sorted buffer for recent writes.
    memtable: MemTable,
    /// Published segments, ascending by generation (oldest first).
    segments: Vec<Segment>,
    /// Generation assigned to the next segment; above every existing one.
    next_generation: u64,
    /// Engine configuration.
    config: Config,
    /// Operation counters.
    metrics: EngineMetrics,
}

impl Strata {
    /// Open or create a Strata storage engine at the configured path.
    ///
    /// Existing segments are discovered by file name, ordered by generation
    /// and have their indexes loaded (or rebuilt). Leftovers of interrupted
    /// writes are removed first.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let metrics = EngineMetrics::new();
        let segments = Self::recover_segments(&config, &metrics)?;
        let next_generation = segments.last().map_or(0, |s| s.generation() + 1);

        log::info!(
            "Strata engine opened at {:?} ({} segments, next generation {})",
            config.data_dir,
            segments.len(),
            next_generation
        );

        Ok(Self {
            memtable: MemTable::new(config.memtable_capacity),
            segments,
            next_generation,
            config,
            metrics,
        })
    }

    fn recover_segments(config: &Config, metrics: &EngineMetrics) -> Result<Vec<Segment>> {
        let dir = &config.data_dir;
        let mut found: Vec<(u64, PathBuf)> = Vec::new();
        let mut index_files: Vec<(String, PathBuf)> = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            if name.ends_with(&format!("{}{}", DATA_SUFFIX, TMP_SUFFIX))
                || name.ends_with(&format!("{}{}", INDEX_SUFFIX, TMP_SUFFIX))
            {
                log::warn!("Removing unfinished segment file {}", name);
                fs::remove_file(entry.path())?;
            } else if let Some(generation) = parse_generation(name) {
                found.push((generation, entry.path()));
            } else if let Some(stem) = name.strip_suffix(INDEX_SUFFIX) {
                index_files.push((stem.to_string(), entry.path()));
            }
        }

        for (stem, path) in index_files {
            if !dir.join(format!("{}{}", stem, DATA_SUFFIX)).exists() {
                log::warn!("Removing orphan index {}", path.display());
                fs::remove_file(&path)?;
            }
        }

        found.sort_by_key(|(generation, _)| *generation);
        if let Some(pair) = found.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(StrataError::corruption(
                &pair[1].1,
                format!("generation {} claimed by more than one file", pair[1].0),
            ));
        }

        let mut segments = Vec::with_capacity(found.len());
        for (_, path) in found {
            let segment = Segment::open(path, config.sync_writes)?;
            metrics.record_segment_loaded(segment.index_rebuilt());
            segments.push(segment);
        }
        Ok(segments)
    }

    /// Insert a key-value pair into the storage engine.
    /// Flushes the MemTable to a new segment once it is full.
    pub fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if !value.is_encodable() {
            return Err(StrataError::InvalidInput(format!(
                "values may not hold NaN or infinite floats or nest deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        self.memtable.put(key.into(), value);
        self.metrics.record_put();
        self.flush_if_full()
    }

    /// Delete a key from the storage engine.
    /// Writes a tombstone that shadows every older value of the key.
    pub fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        self.memtable.delete(key.into());
        self.metrics.record_delete();
        self.flush_if_full()
    }

    /// Get the live value of a key, or `None` if it was never written or
    /// has been deleted.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.metrics.record_get();
        match self.lookup(key)? {
            Lookup::Present(value) => Ok(Some(value)),
            Lookup::Tombstone | Lookup::Absent => Ok(None),
        }
    }

    /// Resolve a key across all layers without collapsing tombstones.
    ///
    /// The MemTable is consulted first, then segments newest to oldest; the
    /// first layer that knows the key decides.
    pub fn lookup(&self, key: &str) -> Result<Lookup> {
        match self.memtable.get(key) {
            Lookup::Absent => {}
            found => {
                log::debug!("{:?} resolved in memtable", key);
                return Ok(found);
            }
        }

        for segment in self.segments.iter().rev() {
            match segment.get(key)? {
                Lookup::Absent => continue,
                found => {
                    log::debug!("{:?} resolved in generation {}", key, segment.generation());
                    return Ok(found);
                }
            }
        }

        Ok(Lookup::Absent)
    }

    /// Every live key-value pair, in key order.
    pub fn scan(&self) -> Result<Vec<(Key, Value)>> {
        self.metrics.record_scan();
        let mut runs = self
            .segments
            .iter()
            .map(Segment::scan)
            .collect::<Result<Vec<_>>>()?;
        runs.push(
            self.memtable
                .iter()
                .map(|(key, stored)| (key.clone(), stored.clone()))
                .collect(),
        );

        let (live, _) = merge_runs(runs);
        Ok(live
            .into_iter()
            .filter_map(|(key, stored)| stored.into_value().map(|value| (key, value)))
            .collect())
    }

    fn flush_if_full(&mut self) -> Result<()> {
        if self.memtable.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the MemTable out as a new, newest segment and empty it.
    /// A no-op when the MemTable is empty.
    pub fn flush(&mut self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let generation = self.next_generation;
        let entries = self.memtable.drain_sorted();
        let segment = match Segment::write(
            &self.config.data_dir,
            generation,
            &entries,
            self.config.sync_writes,
        ) {
            Ok(segment) => segment,
            Err(e) => {
                self.memtable.restore(entries);
                return Err(e);
            }
        };

        log::info!(
            "Flushed {} entries to generation {} ({} bytes)",
            segment.len(),
            generation,
            segment.data_len()
        );
        self.metrics.record_flush(segment.data_len());
        self.segments.push(segment);
        self.next_generation += 1;
        Ok(())
    }

    /// Merge every segment into one, newest generation winning per key and
    /// final tombstones dropped. A no-op with fewer than two segments.
    ///
    /// The merged segment is published before any old file is removed, and
    /// old segments are removed oldest first, so a crash at any point leaves
    /// a directory that still resolves every key correctly.
    pub fn compact(&mut self) -> Result<()> {
        if self.segments.len() < 2 {
            log::debug!("Compaction skipped: {} segment(s)", self.segments.len());
            return Ok(());
        }

        let runs = self
            .segments
            .iter()
            .map(Segment::scan)
            .collect::<Result<Vec<_>>>()?;
        let (live, stats) = merge_runs(runs);

        let generation = self.next_generation;
        let merged = Segment::write(&self.config.data_dir, generation, &live, self.config.sync_writes)?;
        self.next_generation += 1;
        self.metrics.record_compaction(merged.data_len());

        let old = std::mem::replace(&mut self.segments, vec![merged]);
        log::info!(
            "Compacted {} segments into generation {}: {} records in, {} live, {} tombstones purged",
            old.len(),
            generation,
            stats.input_records,
            stats.live_records,
            stats.purged_tombstones
        );
        for segment in &old {
            segment.remove_files()?;
        }
        if self.config.sync_writes {
            sync_dir(&self.config.data_dir)?;
        }
        Ok(())
    }

    /// Flush pending writes and release the engine.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        log::info!("Strata engine at {:?} closed", self.config.data_dir);
        Ok(())
    }

    /// Number of published segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Generations of the published segments, oldest first.
    pub fn generations(&self) -> Vec<u64> {
        self.segments.iter().map(Segment::generation).collect()
    }

    pub fn next_generation(&self) -> u64 {
        self.next_generation
    }

    /// Entries (values and tombstones) waiting in the MemTable.
    pub fn memtable_len(&self) -> usize {
        self.memtable.len()
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stored;

    fn open(dir: &Path, capacity: usize) -> Strata {
        Strata::open(Config::new(dir).with_memtable_capacity(capacity)).unwrap()
    }

    fn segment_keys(engine: &Strata, position: usize) -> Vec<String> {
        engine.segments[position]
            .keys()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_flush_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 4);

        for key in ["d", "b", "a", "c"] {
            engine.put(key, 1).unwrap();
        }

        assert_eq!(engine.segment_count(), 1);
        assert_eq!(engine.memtable_len(), 0);
        assert_eq!(segment_keys(&engine, 0), vec!["a", "b", "c", "d"]);
        let on_disk: Vec<String> = engine.segments[0]
            .scan()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(on_disk, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 2);

        engine.put("a", 1).unwrap();
        engine.put("b", 2).unwrap();
        assert_eq!(engine.segment_count(), 1);
        assert_eq!(engine.memtable_len(), 0);

        engine.put("a", 3).unwrap();
        assert_eq!(engine.memtable_len(), 1);
        assert_eq!(engine.get("a").unwrap(), Some(Value::Int(3)));
        assert_eq!(engine.get("b").unwrap(), Some(Value::Int(2)));
    }

    #[test]
    fn test_delete_in_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("x", "v").unwrap();
        engine.delete("x").unwrap();
        assert_eq!(engine.get("x").unwrap(), None);
        assert_eq!(engine.lookup("x").unwrap(), Lookup::Tombstone);
        assert_eq!(engine.lookup("never").unwrap(), Lookup::Absent);
    }

    #[test]
    fn test_tombstone_in_newer_segment_shadows_older_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("k", "old").unwrap();
        engine.flush().unwrap();
        engine.delete("k").unwrap();
        engine.flush().unwrap();

        assert_eq!(engine.segment_count(), 2);
        assert_eq!(engine.get("k").unwrap(), None);
        assert_eq!(
            engine.segments[0].get("k").unwrap(),
            Lookup::Present(Value::from("old"))
        );
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);
        engine.flush().unwrap();
        assert_eq!(engine.segment_count(), 0);
        assert_eq!(engine.next_generation(), 0);
    }

    #[test]
    fn test_generations_increase() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 1);

        engine.put("a", 1).unwrap();
        engine.put("b", 2).unwrap();
        engine.delete("a").unwrap();

        assert_eq!(engine.generations(), vec![0, 1, 2]);
        assert_eq!(engine.next_generation(), 3);
    }

    #[test]
    fn test_compaction_newest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("a", 1).unwrap();
        engine.flush().unwrap();
        engine.put("a", 2).unwrap();
        engine.flush().unwrap();
        assert_eq!(engine.get("a").unwrap(), Some(Value::Int(2)));

        engine.compact().unwrap();
        assert_eq!(engine.generations(), vec![2]);
        assert_eq!(engine.get("a").unwrap(), Some(Value::Int(2)));
        assert_eq!(
            engine.segments[0].scan().unwrap(),
            vec![("a".to_string(), Stored::Value(Value::Int(2)))]
        );
        assert!(!dir.path().join("000000.seg").exists());
        assert!(!dir.path().join("000001.seg.idx").exists());
    }

    #[test]
    fn test_compaction_purges_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("keep", 1).unwrap();
        engine.put("drop", 2).unwrap();
        engine.flush().unwrap();
        engine.delete("drop").unwrap();
        engine.delete("ghost").unwrap();
        engine.flush().unwrap();

        engine.compact().unwrap();
        assert_eq!(segment_keys(&engine, 0), vec!["keep"]);
        assert_eq!(engine.get("drop").unwrap(), None);
    }

    #[test]
    fn test_compaction_of_all_deleted_leaves_empty_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("a", 1).unwrap();
        engine.flush().unwrap();
        engine.delete("a").unwrap();
        engine.flush().unwrap();

        engine.compact().unwrap();
        assert_eq!(engine.segment_count(), 1);
        assert!(engine.segments[0].is_empty());
        assert_eq!(engine.get("a").unwrap(), None);
    }

    #[test]
    fn test_compaction_single_segment_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("a", 1).unwrap();
        engine.flush().unwrap();
        engine.compact().unwrap();

        assert_eq!(engine.generations(), vec![0]);
        assert_eq!(engine.next_generation(), 1);
    }

    #[test]
    fn test_buffer_shadows_compacted_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("a", 1).unwrap();
        engine.flush().unwrap();
        engine.put("a", 2).unwrap();
        engine.flush().unwrap();
        engine.delete("a").unwrap();

        engine.compact().unwrap();
        assert_eq!(engine.memtable_len(), 1);
        assert_eq!(engine.get("a").unwrap(), None);
    }

    #[test]
    fn test_scan_merges_all_layers() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);

        engine.put("b", 1).unwrap();
        engine.put("c", 1).unwrap();
        engine.flush().unwrap();
        engine.put("a", 2).unwrap();
        engine.delete("c").unwrap();

        assert_eq!(
            engine.scan().unwrap(),
            vec![
                ("a".to_string(), Value::Int(2)),
                ("b".to_string(), Value::Int(1)),
            ]
        );
    }

    #[test]
    fn test_rejects_non_finite_float() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 10);
        assert!(matches!(
            engine.put("f", f64::NAN),
            Err(StrataError::InvalidInput(_))
        ));
        assert_eq!(engine.memtable_len(), 0);
    }

    #[test]
    fn test_rejects_overly_nested_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 1);
        let deep = (0..=MAX_NESTING_DEPTH)
            .fold(Value::Int(1), |inner, _| Value::List(vec![inner]));
        assert!(matches!(
            engine.put("deep", deep),
            Err(StrataError::InvalidInput(_))
        ));
        assert_eq!(engine.memtable_len(), 0);
        assert_eq!(engine.segment_count(), 0);
    }

    #[test]
    fn test_failed_flush_keeps_buffered_writes() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("db");
        let mut engine = open(&data_dir, 10);
        engine.put("a", 1).unwrap();
        engine.put("b", 2).unwrap();
        engine.delete("c").unwrap();

        fs::remove_dir_all(&data_dir).unwrap();
        assert!(engine.flush().is_err());

        assert_eq!(engine.memtable_len(), 3);
        assert_eq!(engine.next_generation(), 0);
        assert_eq!(engine.segment_count(), 0);
        assert_eq!(engine.get("a").unwrap(), Some(Value::Int(1)));
        assert_eq!(engine.get("b").unwrap(), Some(Value::Int(2)));
        assert_eq!(engine.lookup("c").unwrap(), Lookup::Tombstone);

        fs::create_dir_all(&data_dir).unwrap();
        engine.flush().unwrap();
        assert_eq!(engine.memtable_len(), 0);
        assert_eq!(engine.generations(), vec![0]);
        assert_eq!(segment_keys(&engine, 0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_compaction_with_synced_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path())
            .with_memtable_capacity(1)
            .with_sync_writes(true);
        let mut engine = Strata::open(config).unwrap();
        engine.put("a", 1).unwrap();
        engine.put("b", 2).unwrap();
        engine.compact().unwrap();
        assert_eq!(engine.generations(), vec![2]);
        assert!(!dir.path().join("000000.seg").exists());
        assert!(!dir.path().join("000001.seg.idx").exists());
    }

    #[test]
    fn test_recovery_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = open(dir.path(), 10);
            engine.put("a", 1).unwrap();
            engine.close().unwrap();
        }
        fs::write(dir.path().join("000001.seg.tmp"), "{\"key\":").unwrap();
        fs::write(dir.path().join("000001.seg.idx.tmp"), "{}").unwrap();
        fs::write(dir.path().join("000007.seg.idx"), "{}").unwrap();
        fs::write(dir.path().join("README"), "not ours").unwrap();

        let engine = open(dir.path(), 10);
        assert_eq!(engine.generations(), vec![0]);
        assert_eq!(engine.next_generation(), 1);
        assert!(!dir.path().join("000001.seg.tmp").exists());
        assert!(!dir.path().join("000001.seg.idx.tmp").exists());
        assert!(!dir.path().join("000007.seg.idx").exists());
        assert!(dir.path().join("README").exists());
    }

    #[test]
    fn test_duplicate_generation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = open(dir.path(), 10);
            engine.put("a", 1).unwrap();
            engine.close().unwrap();
        }
        fs::copy(dir.path().join("000000.seg"), dir.path().join("0.seg")).unwrap();

        let result = Strata::open(Config::new(dir.path()));
        assert!(matches!(result, Err(StrataError::Corruption { .. })));
    }

    #[test]
    fn test_metrics_track_engine_activity() {
        use std::sync::atomic::Ordering;

        let dir = tempfile::tempdir().unwrap();
        let mut engine = open(dir.path(), 2);
        engine.put("a", 1).unwrap();
        engine.put("b", 2).unwrap();
        engine.get("a").unwrap();

        let metrics = engine.metrics();
        assert_eq!(metrics.puts.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.gets.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.flushes.load(Ordering::Relaxed), 1);
        assert!(metrics.bytes_written.load(Ordering::Relaxed) > 0);
    }
}
