//! STRATA - Segment (Immutable Sorted Run)
//! On-disk storage for flushed MemTable data and compaction output.
//!
//! ## Layout
//! Each segment is a pair of files in the engine directory:
//! - `<generation:06>.seg`: one JSON record per line, keys strictly ascending
//! - `<generation:06>.seg.idx`: JSON sidecar mapping every key to its byte offset
//!
//! ## Record Format
//! ```text
//! {"key":"a","stored":{"value":1},"crc":<u32>}
//! {"key":"b","stored":"tombstone","crc":<u32>}
//! ```
//! `crc` is CRC32 over the key bytes followed by the JSON encoding of `stored`.
//!
//! ## Publication
//! Both files are written under a `.tmp` suffix, synced, then renamed into
//! place (index first, data last). A segment is only discoverable once its
//! `.seg` name exists, so a crash mid-write never exposes a partial segment.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};
use crate::types::{Key, Lookup, Stored};

/// Extension of segment data files.
pub const DATA_SUFFIX: &str = ".seg";
/// Extension of segment index sidecars.
pub const INDEX_SUFFIX: &str = ".seg.idx";
/// Suffix of files that are still being written.
pub const TMP_SUFFIX: &str = ".tmp";

/// Name of the data file for a generation.
pub fn data_file_name(generation: u64) -> String {
    format!("{:06}{}", generation, DATA_SUFFIX)
}

/// Parse the generation out of a data file name such as `000042.seg`.
/// Index sidecars, temp files and foreign files yield `None`.
pub fn parse_generation(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(DATA_SUFFIX)?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// One line of a segment data file.
#[derive(Debug, Deserialize)]
struct Record {
    key: Key,
    stored: Stored,
    crc: u32,
}

#[derive(Serialize)]
struct RecordRef<'a> {
    key: &'a str,
    stored: &'a Stored,
    crc: u32,
}

/// Sidecar index document.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    record_count: usize,
    data_len: u64,
    offsets: BTreeMap<Key, u64>,
}

fn record_checksum(key: &str, stored: &Stored) -> Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key.as_bytes());
    hasher.update(&serde_json::to_vec(stored)?);
    Ok(hasher.finalize())
}

fn encode_record(key: &str, stored: &Stored) -> Result<Vec<u8>> {
    let crc = record_checksum(key, stored)?;
    let mut line = serde_json::to_vec(&RecordRef { key, stored, crc })?;
    line.push(b'\n');
    Ok(line)
}

fn decode_record(path: &Path, line: &[u8]) -> Result<Record> {
    let body = line
        .strip_suffix(b"\n")
        .ok_or_else(|| StrataError::corruption(path, "truncated record"))?;
    let record: Record = serde_json::from_slice(body)
        .map_err(|e| StrataError::corruption(path, format!("unreadable record: {}", e)))?;
    if record_checksum(&record.key, &record.stored)? != record.crc {
        return Err(StrataError::corruption(
            path,
            format!("checksum mismatch for key {:?}", record.key),
        ));
    }
    Ok(record)
}

/// Make renames and removals inside `dir` durable.
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

/// Write `bytes` to `final_path` through a synced temp file and a rename.
fn publish_file(final_path: &Path, bytes: &[u8], sync: bool) -> Result<()> {
    let tmp = with_suffix(final_path, TMP_SUFFIX);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        if sync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, final_path)?;
    Ok(())
}

/// An immutable, sorted, on-disk run of entries plus a full key index.
#[derive(Debug)]
pub struct Segment {
    generation: u64,
    path: PathBuf,
    /// Byte offset of every key's record in the data file.
    index: HashMap<Key, u64>,
    /// Size of the data file in bytes.
    data_len: u64,
    /// Set when the sidecar was missing or stale and had to be rebuilt.
    index_rebuilt: bool,
}

impl Segment {
    /// Serialize `entries` as a new segment of `generation` inside `dir`.
    ///
    /// Entries must be strictly ascending by key. The segment becomes
    /// visible under its final name only after both files are complete.
    pub fn write(dir: &Path, generation: u64, entries: &[(Key, Stored)], sync: bool) -> Result<Self> {
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 >= pair[1].0) {
            return Err(StrataError::InvalidInput(format!(
                "segment entries out of order: {:?} then {:?}",
                pair[0].0, pair[1].0
            )));
        }

        let path = dir.join(data_file_name(generation));
        let data_tmp = with_suffix(&path, TMP_SUFFIX);
        match Self::publish(&path, &data_tmp, entries, sync) {
            Ok((index, data_len)) => {
                if sync {
                    sync_dir(dir)?;
                }
                log::debug!(
                    "Segment {} written with {} entries",
                    path.display(),
                    index.len()
                );
                Ok(Self {
                    generation,
                    path,
                    index,
                    data_len,
                    index_rebuilt: false,
                })
            }
            Err(e) => {
                let _ = fs::remove_file(&data_tmp);
                let _ = fs::remove_file(with_suffix(&Self::index_path_for(&path), TMP_SUFFIX));
                Err(e)
            }
        }
    }

    fn publish(
        path: &Path,
        data_tmp: &Path,
        entries: &[(Key, Stored)],
        sync: bool,
    ) -> Result<(HashMap<Key, u64>, u64)> {
        let mut writer = BufWriter::new(File::create(data_tmp)?);
        let mut index = HashMap::with_capacity(entries.len());
        let mut offset = 0u64;
        for (key, stored) in entries {
            let line = encode_record(key, stored)?;
            writer.write_all(&line)?;
            index.insert(key.clone(), offset);
            offset += line.len() as u64;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        if sync {
            file.sync_all()?;
        }
        drop(file);

        Self::write_index(&Self::index_path_for(path), &index, offset, sync)?;
        fs::rename(data_tmp, path)?;
        Ok((index, offset))
    }

    fn write_index(index_path: &Path, index: &HashMap<Key, u64>, data_len: u64, sync: bool) -> Result<()> {
        let doc = IndexFile {
            record_count: index.len(),
            data_len,
            offsets: index.iter().map(|(k, &off)| (k.clone(), off)).collect(),
        };
        publish_file(index_path, &serde_json::to_vec(&doc)?, sync)
    }

    /// Open a published segment, loading (or rebuilding) its index.
    pub fn open(path: impl Into<PathBuf>, sync: bool) -> Result<Self> {
        let path = path.into();
        let generation = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_generation)
            .ok_or_else(|| {
                StrataError::InvalidInput(format!("not a segment file: {}", path.display()))
            })?;

        let mut segment = Self {
            generation,
            path,
            index: HashMap::new(),
            data_len: 0,
            index_rebuilt: false,
        };
        segment.load_index(sync)?;
        Ok(segment)
    }

    /// Load the sidecar index; rebuild it by scanning the data file when the
    /// sidecar is missing or malformed.
    ///
    /// A well-formed sidecar that describes a different data file (length or
    /// offsets past the end) means the data file changed after publish, and
    /// is reported as corruption rather than papered over.
    pub fn load_index(&mut self, sync: bool) -> Result<()> {
        let data_len = fs::metadata(&self.path)?.len();
        self.data_len = data_len;
        if let Some(index) = self.read_index_file(data_len)? {
            self.index = index;
            self.index_rebuilt = false;
            return Ok(());
        }

        let mut index = HashMap::new();
        for (offset, key, _) in self.scan_with_offsets()? {
            index.insert(key, offset);
        }
        Self::write_index(&self.index_path(), &index, data_len, sync)?;
        if sync {
            if let Some(dir) = self.path.parent() {
                sync_dir(dir)?;
            }
        }
        log::info!(
            "Rebuilt index for {} ({} keys)",
            self.path.display(),
            index.len()
        );
        self.index = index;
        self.index_rebuilt = true;
        Ok(())
    }

    fn read_index_file(&self, data_len: u64) -> Result<Option<HashMap<Key, u64>>> {
        let index_path = self.index_path();
        let bytes = match fs::read(&index_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Index {} missing, rebuilding", index_path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let doc: IndexFile = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("Index {} unreadable ({}), rebuilding", index_path.display(), e);
                return Ok(None);
            }
        };

        if doc.record_count != doc.offsets.len() {
            log::warn!(
                "Index {} claims {} records but lists {}, rebuilding",
                index_path.display(),
                doc.record_count,
                doc.offsets.len()
            );
            return Ok(None);
        }

        if doc.data_len != data_len {
            return Err(StrataError::corruption(
                &self.path,
                format!(
                    "data file is {} bytes but its index describes {} bytes",
                    data_len, doc.data_len
                ),
            ));
        }
        if let Some((key, off)) = doc.offsets.iter().find(|&(_, &off)| off >= data_len) {
            return Err(StrataError::corruption(
                &self.path,
                format!("index offset {} for key {:?} is past end of data", off, key),
            ));
        }

        Ok(Some(doc.offsets.into_iter().collect()))
    }

    /// Point lookup: one index lookup, one seek, one record read.
    pub fn get(&self, key: &str) -> Result<Lookup> {
        let Some(&offset) = self.index.get(key) else {
            return Ok(Lookup::Absent);
        };

        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(offset))?;
        let mut line = Vec::new();
        reader.read_until(b'\n', &mut line)?;

        let record = decode_record(&self.path, &line)?;
        if record.key != key {
            return Err(StrataError::corruption(
                &self.path,
                format!("index offset {} for {:?} points at {:?}", offset, key, record.key),
            ));
        }
        Ok(record.stored.into())
    }

    /// Read every entry in key order.
    pub fn scan(&self) -> Result<Vec<(Key, Stored)>> {
        Ok(self
            .scan_with_offsets()?
            .into_iter()
            .map(|(_, key, stored)| (key, stored))
            .collect())
    }

    fn scan_with_offsets(&self) -> Result<Vec<(u64, Key, Stored)>> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut entries: Vec<(u64, Key, Stored)> = Vec::new();
        let mut offset = 0u64;
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            let record = decode_record(&self.path, &line)?;
            if let Some((_, prev, _)) = entries.last() {
                if *prev >= record.key {
                    return Err(StrataError::corruption(
                        &self.path,
                        format!("key {:?} follows {:?}", record.key, prev),
                    ));
                }
            }
            entries.push((offset, record.key, record.stored));
            offset += n as u64;
        }

        Ok(entries)
    }

    /// Delete the data file, then its index. Missing files are ignored.
    pub fn remove_files(&self) -> Result<()> {
        for path in [self.path.clone(), self.index_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_path(&self) -> PathBuf {
        Self::index_path_for(&self.path)
    }

    fn index_path_for(path: &Path) -> PathBuf {
        with_suffix(path, ".idx")
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Size of the data file in bytes.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Keys held by this segment, in ascending order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.index.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn index_rebuilt(&self) -> bool {
        self.index_rebuilt
    }
}
