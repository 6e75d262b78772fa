//! # raft-storage
//!
//! why: provide durable persistence for raft state using standard rust fs apis
//! relations: implements raft_core::Storage, handed to RaftNode::new as a boxed trait object
//! what: FileStorage implementation, InMemoryStorage for testing

pub use raft_core::Storage;

use raft_core::{LogEntry, SnapshotMeta};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

fn invalid_data(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

// -- file storage implementation --

/// file-based storage implementation using std::fs
///
/// stores raft state in a directory with:
/// - meta.json: term and voted_for
/// - log.json: array of log entries
/// - snapshot.json: snapshot boundary and payload, replaced in one rename
pub struct FileStorage {
    /// directory path for storing state files
    dir: PathBuf,
}

impl FileStorage {
    /// create a new filestorage at the given directory
    /// creates the directory if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log.json")
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("snapshot.json")
    }

    /// atomic write: write to temp file, sync, then rename over the target
    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut temp_path = target.as_os_str().to_owned();
        temp_path.push(".tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, target)?;
        Ok(())
    }

    fn write_json<V: Serialize>(&self, target: &Path, value: &V) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(invalid_data)?;
        self.write_atomic(target, json.as_bytes())
    }

    /// read a json file, `None` if it was never written
    fn read_json<V: DeserializeOwned>(&self, path: &Path) -> io::Result<Option<V>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        serde_json::from_str(&contents).map(Some).map_err(invalid_data)
    }
}

/// metadata structure for term and vote
#[derive(serde::Serialize, serde::Deserialize, Default)]
struct MetaData {
    term: u64,
    voted_for: Option<u64>,
}

/// snapshot boundary and payload, always written together
#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotFile {
    meta: SnapshotMeta,
    data: Vec<u8>,
}

impl Storage for FileStorage {
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<u64>) -> io::Result<()> {
        self.write_json(&self.meta_path(), &MetaData { term, voted_for })
    }

    fn load_term_and_vote(&self) -> io::Result<(u64, Option<u64>)> {
        // default for new nodes
        let meta: MetaData = self.read_json(&self.meta_path())?.unwrap_or_default();
        Ok((meta.term, meta.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        // write entire log (simple approach - could optimize with append-only file)
        let mut log = self.load_log()?;
        log.extend(entries.iter().cloned());
        self.write_json(&self.log_path(), &log)
    }

    fn load_log(&self) -> io::Result<Vec<LogEntry>> {
        Ok(self.read_json(&self.log_path())?.unwrap_or_default())
    }

    fn truncate_log_from(&mut self, from_index: u64) -> io::Result<()> {
        let mut log = self.load_log()?;
        log.retain(|e| e.index < from_index);
        self.write_json(&self.log_path(), &log)
    }

    fn save_snapshot(&mut self, meta: SnapshotMeta, data: &[u8]) -> io::Result<()> {
        let snapshot = SnapshotFile {
            meta,
            data: data.to_vec(),
        };
        self.write_json(&self.snapshot_path(), &snapshot)?;

        // entries covered by the snapshot are never read again
        let mut log = self.load_log()?;
        let before = log.len();
        log.retain(|e| e.index > meta.last_included_index);
        if log.len() != before {
            self.write_json(&self.log_path(), &log)?;
        }
        Ok(())
    }

    fn load_snapshot(&self) -> io::Result<Option<(SnapshotMeta, Vec<u8>)>> {
        let snapshot = self.read_json::<SnapshotFile>(&self.snapshot_path())?;
        Ok(snapshot.map(|s| (s.meta, s.data)))
    }

    fn clear(&mut self) -> io::Result<()> {
        let _ = fs::remove_file(self.meta_path());
        let _ = fs::remove_file(self.log_path());
        let _ = fs::remove_file(self.snapshot_path());
        Ok(())
    }
}

// -- in-memory storage implementation --

/// in-memory storage for testing
///
/// stores all state in memory, no persistence across restarts
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    term: u64,
    voted_for: Option<u64>,
    log: Vec<LogEntry>,
    snapshot: Option<(SnapshotMeta, Vec<u8>)>,
}

impl InMemoryStorage {
    /// create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<u64>) -> io::Result<()> {
        self.term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> io::Result<(u64, Option<u64>)> {
        Ok((self.term, self.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        self.log.extend(entries.iter().cloned());
        Ok(())
    }

    fn load_log(&self) -> io::Result<Vec<LogEntry>> {
        Ok(self.log.clone())
    }

    fn truncate_log_from(&mut self, from_index: u64) -> io::Result<()> {
        self.log.retain(|e| e.index < from_index);
        Ok(())
    }

    fn save_snapshot(&mut self, meta: SnapshotMeta, data: &[u8]) -> io::Result<()> {
        self.log.retain(|e| e.index > meta.last_included_index);
        self.snapshot = Some((meta, data.to_vec()));
        Ok(())
    }

    fn load_snapshot(&self) -> io::Result<Option<(SnapshotMeta, Vec<u8>)>> {
        Ok(self.snapshot.clone())
    }

    fn clear(&mut self) -> io::Result<()> {
        *self = Self::default();
        Ok(())
    }
}
