//! STRATA - MemTable (In-Memory Sorted Map)
//! The MemTable is the write buffer of the LSM-Tree.
//! All writes go here first before being flushed to segments on disk.

use std::collections::BTreeMap;

use crate::types::{Key, Lookup, Stored, Value};

/// In-memory sorted key-value store backed by a BTreeMap.
/// Serves as the write buffer in the LSM-Tree architecture.
pub struct MemTable {
    /// Sorted map of pending writes, tombstones included.
    entries: BTreeMap<Key, Stored>,
    /// Entry count at which the buffer reports itself full.
    capacity: usize,
}

impl MemTable {
    /// Create a new, empty MemTable that fills up at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    /// Returns the number of entries in the MemTable, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the MemTable is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the entry count has reached capacity.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Insert a key-value pair into the MemTable.
    /// If the key already exists, the old value or tombstone is replaced.
    pub fn put(&mut self, key: Key, value: Value) {
        self.entries.insert(key, Stored::Value(value));
    }

    /// Delete a key by inserting a tombstone marker.
    /// The key stays in the map so the deletion shadows older segments.
    pub fn delete(&mut self, key: Key) {
        self.entries.insert(key, Stored::Tombstone);
    }

    /// Look a key up, distinguishing "deleted here" from "never written here".
    pub fn get(&self, key: &str) -> Lookup {
        match self.entries.get(key) {
            Some(stored) => stored.clone().into(),
            None => Lookup::Absent,
        }
    }

    /// Take every entry out in ascending key order, leaving the MemTable empty.
    pub fn drain_sorted(&mut self) -> Vec<(Key, Stored)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    /// Put back entries from a failed flush. Writes made since the drain win.
    pub fn restore(&mut self, entries: Vec<(Key, Stored)>) {
        for (key, stored) in entries {
            self.entries.entry(key).or_insert(stored);
        }
    }

    /// Sorted view over the pending writes.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Stored)> {
        self.entries.iter()
    }
}
