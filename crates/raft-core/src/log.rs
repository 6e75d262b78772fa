//! # log
//!
//! why: manage the replicated log of commands that raft agrees on, behind a snapshot boundary
//! relations: owned by state.rs, read by the handlers when building and reducing rpcs, persisted via Storage
//! what: LogEntry, SnapshotMeta, RaftLog with index/term lookup, append, truncation and compaction

use serde::{Deserialize, Serialize};

use crate::error::RaftError;

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: u64,
    /// The index of this entry in the log (1-indexed)
    pub index: u64,
    /// The command to be applied to the state machine
    pub command: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: u64, index: u64, command: Vec<u8>) -> Self {
        Self { term, index, command }
    }
}

/// Boundary of the most recent snapshot.
///
/// Entries at or below `last_included_index` are folded into the snapshot and
/// can no longer be looked up one by one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub last_included_index: u64,
    pub last_included_term: u64,
}

/// In-memory view of the log: a snapshot prefix followed by individual entries.
///
/// `entries[i].index == snapshot.last_included_index + 1 + i` always holds.
#[derive(Debug, Clone, Default)]
pub struct RaftLog {
    snapshot: SnapshotMeta,
    snapshot_data: Vec<u8>,
    entries: Vec<LogEntry>,
}

impl RaftLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted parts. Entries already covered by the
    /// snapshot, or not contiguous with it, are dropped.
    pub fn restore(snapshot: SnapshotMeta, snapshot_data: Vec<u8>, entries: Vec<LogEntry>) -> Self {
        let mut log = Self {
            snapshot,
            snapshot_data,
            entries: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            if entry.index == log.last_index() + 1 {
                log.entries.push(entry);
            }
        }
        log
    }

    pub fn snapshot_meta(&self) -> SnapshotMeta {
        self.snapshot
    }

    pub fn snapshot_data(&self) -> &[u8] {
        &self.snapshot_data
    }

    /// Index of the last entry, counting the snapshot prefix
    pub fn last_index(&self) -> u64 {
        self.snapshot.last_included_index + self.entries.len() as u64
    }

    /// Term of the last entry, falling back to the snapshot term
    pub fn last_term(&self) -> u64 {
        self.entries
            .last()
            .map(|e| e.term)
            .unwrap_or(self.snapshot.last_included_term)
    }

    /// Entry at `index`, or `None` when it is past the end or compacted away
    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        if index <= self.snapshot.last_included_index {
            return None;
        }
        let offset = index - self.snapshot.last_included_index - 1;
        self.entries.get(offset as usize)
    }

    /// Term at `index`. The snapshot boundary itself (and index 0) still has a
    /// known term even though its entry is gone.
    pub fn term_at(&self, index: u64) -> Option<u64> {
        if index == self.snapshot.last_included_index {
            return Some(self.snapshot.last_included_term);
        }
        self.get(index).map(|e| e.term)
    }

    /// All retained entries from `start` (inclusive) to the end of the log
    pub fn entries_from(&self, start: u64) -> Vec<LogEntry> {
        let start = start.max(self.snapshot.last_included_index + 1);
        let offset = (start - self.snapshot.last_included_index - 1) as usize;
        self.entries.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Append a command at the next index and return the stored entry
    pub fn append(&mut self, term: u64, command: Vec<u8>) -> LogEntry {
        let entry = LogEntry::new(term, self.last_index() + 1, command);
        self.entries.push(entry.clone());
        entry
    }

    /// Push an entry received from a leader. The caller guarantees contiguity.
    pub(crate) fn push(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.index, self.last_index() + 1);
        self.entries.push(entry);
    }

    /// Drop every entry with index >= `from_index`
    pub fn truncate_from(&mut self, from_index: u64) {
        if from_index <= self.snapshot.last_included_index {
            self.entries.clear();
            return;
        }
        let keep = (from_index - self.snapshot.last_included_index - 1) as usize;
        self.entries.truncate(keep);
    }

    /// Last retained entry carrying `term`, used by the leader to skip a whole
    /// conflicting term when backing off
    pub fn last_entry_by_term(&self, term: u64) -> Option<&LogEntry> {
        self.entries.iter().rev().find(|e| e.term == term)
    }

    /// First retained index of the run of `term` that ends at or before `index`
    pub fn first_index_of_term(&self, term: u64, index: u64) -> u64 {
        let floor = self.snapshot.last_included_index + 1;
        let mut first = index.max(floor);
        while first > floor && self.term_at(first - 1) == Some(term) {
            first -= 1;
        }
        first
    }

    /// Fold every entry up to `index` into a snapshot holding `data`
    pub fn compact(&mut self, index: u64, data: Vec<u8>) -> Result<SnapshotMeta, RaftError> {
        if index <= self.snapshot.last_included_index {
            return Ok(self.snapshot);
        }
        let term = self.term_at(index).ok_or(RaftError::SnapshotOutOfRange {
            index,
            last_index: self.last_index(),
        })?;
        let drained = (index - self.snapshot.last_included_index) as usize;
        self.entries.drain(..drained);
        self.snapshot = SnapshotMeta {
            last_included_index: index,
            last_included_term: term,
        };
        self.snapshot_data = data;
        Ok(self.snapshot)
    }

    /// Replace the log prefix with a snapshot received from the leader.
    ///
    /// When an entry matching the snapshot boundary exists the suffix after it
    /// is kept, otherwise the whole log is discarded. Returns whether any
    /// entries past the boundary survived.
    pub fn install_snapshot(&mut self, meta: SnapshotMeta, data: Vec<u8>) -> bool {
        let retained = if self.term_at(meta.last_included_index) == Some(meta.last_included_term)
            && meta.last_included_index >= self.snapshot.last_included_index
        {
            self.entries_from(meta.last_included_index + 1)
        } else {
            Vec::new()
        };
        let kept_suffix = !retained.is_empty();
        self.snapshot = meta;
        self.snapshot_data = data;
        self.entries = retained;
        kept_suffix
    }
}
