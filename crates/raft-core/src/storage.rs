//! # storage
//!
//! why: let the core persist term, vote, log and snapshot before it answers any rpc
//! relations: called from state.rs on every durable change, implemented by the raft-storage crate
//! what: Storage trait

use std::io;

use crate::log::{LogEntry, SnapshotMeta};

/// trait for durable storage of raft state
///
/// this abstraction allows the same core to work with:
/// - real filesystem (native)
/// - in-memory (testing)
pub trait Storage: Send {
    /// persist the current term and voted_for
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<u64>) -> io::Result<()>;

    /// load the persisted term and voted_for
    fn load_term_and_vote(&self) -> io::Result<(u64, Option<u64>)>;

    /// append entries to the log
    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()>;

    /// load all log entries (for crash recovery)
    fn load_log(&self) -> io::Result<Vec<LogEntry>>;

    /// truncate log from given index (for conflict resolution)
    fn truncate_log_from(&mut self, from_index: u64) -> io::Result<()>;

    /// persist the latest snapshot, replacing any older one
    fn save_snapshot(&mut self, meta: SnapshotMeta, data: &[u8]) -> io::Result<()>;

    /// load the latest snapshot, if one was ever saved
    fn load_snapshot(&self) -> io::Result<Option<(SnapshotMeta, Vec<u8>)>>;

    /// clear all persisted state (for testing)
    fn clear(&mut self) -> io::Result<()>;
}
