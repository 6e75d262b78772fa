//! # message
//!
//! why: define the raft rpc payloads exchanged between nodes
//! relations: built by state.rs, reduced by handlers/, carried by any Transport implementation
//! what: RequestVote, AppendEntries and InstallSnapshot request/response pairs

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::state::NodeId;

/// Request a vote during leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: u64,
    pub candidate_id: NodeId,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

/// Response to a vote request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

/// Replicate log entries (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: NodeId,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

/// Response to AppendEntries.
///
/// On rejection the follower fills in hints so the leader can skip back more
/// than one index per round trip:
/// - `follower_log_len` is set when the follower has no entry at
///   `prev_log_index`; it names the first index the follower is missing.
/// - otherwise `conflict_term` is the follower's term at `prev_log_index` and
///   `conflict_index` the first index it holds for that term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
    pub conflict_index: u64,
    pub conflict_term: Option<u64>,
    pub follower_log_len: Option<u64>,
}

impl AppendEntriesResponse {
    pub fn accepted(term: u64) -> Self {
        Self {
            term,
            success: true,
            conflict_index: 0,
            conflict_term: None,
            follower_log_len: None,
        }
    }

    pub fn rejected(term: u64) -> Self {
        Self {
            success: false,
            ..Self::accepted(term)
        }
    }
}

/// Ship the leader's snapshot to a follower that fell behind the compacted prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: u64,
    pub leader_id: NodeId,
    pub last_included_index: u64,
    pub last_included_term: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: u64,
}

/// What the leader should send a peer next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Append(AppendEntriesRequest),
    Snapshot(InstallSnapshotRequest),
}
