//! STRATA - Engine Metrics & Observability
//! Provides atomic counters for tracking engine operations.
//!
//! Counters are atomics so that read paths taking `&self` can record
//! into them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for the Strata engine.
///
/// All counters use `Ordering::Relaxed`; they are observational only.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Total number of `put` operations.
    pub puts: AtomicU64,
    /// Total number of `get` operations.
    pub gets: AtomicU64,
    /// Total number of `delete` operations.
    pub deletes: AtomicU64,
    /// Total number of `scan` operations.
    pub scans: AtomicU64,
    /// Total number of MemTable → segment flushes.
    pub flushes: AtomicU64,
    /// Total number of compactions that actually merged segments.
    pub compactions: AtomicU64,
    /// Segment bytes written by flushes and compactions.
    pub bytes_written: AtomicU64,
    /// Segments discovered at startup.
    pub segments_loaded: AtomicU64,
    /// Indexes rebuilt from a data scan.
    pub index_rebuilds: AtomicU64,
    /// Timestamp when the engine was opened.
    engine_started: Instant,
}

impl EngineMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            scans: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            compactions: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            segments_loaded: AtomicU64::new(0),
            index_rebuilds: AtomicU64::new(0),
            engine_started: Instant::now(),
        }
    }

    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush that wrote `bytes` of segment data.
    pub fn record_flush(&self, bytes: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a compaction that wrote `bytes` of segment data.
    pub fn record_compaction(&self, bytes: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a segment opened at startup.
    pub fn record_segment_loaded(&self, index_rebuilt: bool) {
        self.segments_loaded.fetch_add(1, Ordering::Relaxed);
        if index_rebuilt {
            self.index_rebuilds.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get engine uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.engine_started.elapsed().as_secs_f64()
    }

    /// Get total number of operations (puts + gets + deletes + scans).
    pub fn total_ops(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
            + self.gets.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
            + self.scans.load(Ordering::Relaxed)
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ STRATA Engine Metrics ═══\n\
             Operations:\n\
               puts:        {}\n\
               gets:        {}\n\
               deletes:     {}\n\
               scans:       {}\n\
               total ops:   {}\n\
             Storage:\n\
               flushes:     {}\n\
               compactions: {}\n\
               written:     {} bytes\n\
             Startup:\n\
               segments loaded: {}\n\
               index rebuilds:  {}\n\
             Uptime: {:.2}s",
            self.puts.load(Ordering::Relaxed),
            self.gets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
            self.scans.load(Ordering::Relaxed),
            self.total_ops(),
            self.flushes.load(Ordering::Relaxed),
            self.compactions.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
            self.segments_loaded.load(Ordering::Relaxed),
            self.index_rebuilds.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operations() {
        let m = EngineMetrics::new();

        m.record_put();
        m.record_put();
        m.record_get();
        m.record_delete();
        m.record_scan();
        m.record_flush(100);
        m.record_compaction(40);

        assert_eq!(m.puts.load(Ordering::Relaxed), 2);
        assert_eq!(m.gets.load(Ordering::Relaxed), 1);
        assert_eq!(m.deletes.load(Ordering::Relaxed), 1);
        assert_eq!(m.scans.load(Ordering::Relaxed), 1);
        assert_eq!(m.flushes.load(Ordering::Relaxed), 1);
        assert_eq!(m.compactions.load(Ordering::Relaxed), 1);
        assert_eq!(m.bytes_written.load(Ordering::Relaxed), 140);
        assert_eq!(m.total_ops(), 5);
    }

    #[test]
    fn test_segment_loads() {
        let m = EngineMetrics::new();
        m.record_segment_loaded(false);
        m.record_segment_loaded(true);
        assert_eq!(m.segments_loaded.load(Ordering::Relaxed), 2);
        assert_eq!(m.index_rebuilds.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_report_format() {
        let m = EngineMetrics::default();
        m.record_put();
        let report = m.report();
        assert!(report.contains("puts:"));
        assert!(report.contains("compactions:"));
        assert!(report.contains("index rebuilds:"));
    }
}
