//! # state
//!
//! why: keep term, role, log and per-peer progress in one object that is only ever touched under one lock
//! relations: wrapped in a mutex by node/, mutated by handlers/, persisted through Storage
//! what: Role, NodeStatus, RaftState with validated role transitions and the commit advancer

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::RaftError;
use crate::log::{LogEntry, RaftLog, SnapshotMeta};
use crate::message::{AppendEntriesRequest, InstallSnapshotRequest, Outbound, RequestVoteRequest};
use crate::storage::Storage;

pub type NodeId = u64;

/// The three possible roles a Raft node can be in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Passive state - listens for heartbeats, votes when asked
    #[default]
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Follower => write!(f, "follower"),
            Role::Candidate => write!(f, "candidate"),
            Role::Leader => write!(f, "leader"),
        }
    }
}

/// Point-in-time summary of a node, for embedders and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub term: u64,
    pub role: Role,
    pub leader_id: Option<NodeId>,
    pub commit_index: u64,
    pub last_log_index: u64,
    pub snapshot_index: u64,
}

/// Everything a node mutates while reacting to timeouts and rpc replies.
///
/// Fields are private: every change goes through a method that keeps the
/// "reconcile term, check staleness, then mutate" order intact.
pub struct RaftState {
    id: NodeId,
    peers: Vec<NodeId>,

    // Persistent state
    current_term: u64,
    voted_for: Option<NodeId>,
    log: RaftLog,

    // Volatile state on all servers
    role: Role,
    leader_id: Option<NodeId>,
    commit_index: u64,
    last_contact: Instant,
    commit_tx: watch::Sender<u64>,

    // Volatile state on leaders (reinitialized after election)
    next_index: HashMap<NodeId, u64>,
    match_index: HashMap<NodeId, u64>,
    installing_snapshot: HashSet<NodeId>,

    storage: Box<dyn Storage>,
}

impl fmt::Debug for RaftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaftState")
            .field("id", &self.id)
            .field("current_term", &self.current_term)
            .field("role", &self.role)
            .field("voted_for", &self.voted_for)
            .field("commit_index", &self.commit_index)
            .field("last_log_index", &self.log.last_index())
            .finish_non_exhaustive()
    }
}

impl RaftState {
    /// Fresh state for a node that has never run. `cluster` lists every
    /// member, this node included.
    pub fn new(id: NodeId, cluster: &[NodeId], storage: Box<dyn Storage>) -> Self {
        Self::from_parts(id, cluster, 0, None, RaftLog::new(), storage)
    }

    /// Rebuild state from whatever `storage` recorded before a restart
    pub fn restore(id: NodeId, cluster: &[NodeId], storage: Box<dyn Storage>) -> Result<Self, RaftError> {
        let (term, voted_for) = storage.load_term_and_vote()?;
        let (meta, data) = storage.load_snapshot()?.unwrap_or_default();
        let log = RaftLog::restore(meta, data, storage.load_log()?);
        tracing::debug!(
            id,
            term,
            last_log_index = log.last_index(),
            snapshot_index = meta.last_included_index,
            "restored persisted state"
        );
        Ok(Self::from_parts(id, cluster, term, voted_for, log, storage))
    }

    fn from_parts(
        id: NodeId,
        cluster: &[NodeId],
        current_term: u64,
        voted_for: Option<NodeId>,
        log: RaftLog,
        storage: Box<dyn Storage>,
    ) -> Self {
        let mut peers: Vec<NodeId> = cluster.iter().copied().filter(|&p| p != id).collect();
        peers.sort_unstable();
        peers.dedup();
        let commit_index = log.snapshot_meta().last_included_index;
        let (commit_tx, _) = watch::channel(commit_index);
        Self {
            id,
            peers,
            current_term,
            voted_for,
            log,
            role: Role::Follower,
            leader_id: None,
            commit_index,
            last_contact: Instant::now(),
            commit_tx,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            installing_snapshot: HashSet::new(),
            storage,
        }
    }

    // -- accessors --

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Every other member of the cluster
    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<NodeId> {
        self.voted_for
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn log(&self) -> &RaftLog {
        &self.log
    }

    pub fn next_index(&self, peer: NodeId) -> Option<u64> {
        self.next_index.get(&peer).copied()
    }

    pub fn match_index(&self, peer: NodeId) -> Option<u64> {
        self.match_index.get(&peer).copied()
    }

    pub fn is_installing_snapshot(&self, peer: NodeId) -> bool {
        self.installing_snapshot.contains(&peer)
    }

    /// When this node last heard from a valid leader or granted a vote
    pub fn last_contact(&self) -> Instant {
        self.last_contact
    }

    pub fn cluster_size(&self) -> usize {
        self.peers.len() + 1
    }

    /// Votes (or replicas) needed for a majority: `floor(n/2) + 1`
    pub fn quorum_size(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// Receiver that observes every commit index advance
    pub fn subscribe_commit(&self) -> watch::Receiver<u64> {
        self.commit_tx.subscribe()
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.id,
            term: self.current_term,
            role: self.role,
            leader_id: self.leader_id,
            commit_index: self.commit_index,
            last_log_index: self.log.last_index(),
            snapshot_index: self.log.snapshot_meta().last_included_index,
        }
    }

    // -- role transitions --

    /// Adopt `term` if it is newer than ours, stepping down to follower.
    /// Returns whether the term changed.
    pub fn update_term(&mut self, term: u64) -> Result<bool, RaftError> {
        if term <= self.current_term {
            return Ok(false);
        }
        self.storage.save_term_and_vote(term, None)?;
        if self.role != Role::Follower {
            tracing::info!(id = self.id, from = %self.role, old_term = self.current_term, new_term = term, "stepping down");
        }
        self.current_term = term;
        self.voted_for = None;
        self.role = Role::Follower;
        self.leader_id = None;
        self.installing_snapshot.clear();
        Ok(true)
    }

    /// Start a new candidacy: bump the term and vote for ourselves.
    /// A leader never runs for election again in its own right.
    pub fn become_candidate(&mut self) -> Result<u64, RaftError> {
        if self.role == Role::Leader {
            return Err(RaftError::InvalidTransition {
                from: Role::Leader,
                to: Role::Candidate,
            });
        }
        let term = self.current_term + 1;
        self.storage.save_term_and_vote(term, Some(self.id))?;
        self.role = Role::Candidate;
        self.current_term = term;
        self.voted_for = Some(self.id);
        self.leader_id = None;
        tracing::info!(id = self.id, term = self.current_term, "became candidate");
        Ok(self.current_term)
    }

    /// Take leadership for `term`, which must be the candidacy still in progress
    pub fn become_leader(&mut self, term: u64) -> Result<(), RaftError> {
        if self.role != Role::Candidate || self.current_term != term {
            return Err(RaftError::InvalidTransition {
                from: self.role,
                to: Role::Leader,
            });
        }
        self.role = Role::Leader;
        self.leader_id = Some(self.id);

        let next = self.log.last_index() + 1;
        self.next_index = self.peers.iter().map(|&p| (p, next)).collect();
        self.match_index = self.peers.iter().map(|&p| (p, 0)).collect();
        self.installing_snapshot.clear();

        tracing::info!(id = self.id, term, next_index = next, "became leader");
        // a lone node is its own majority
        self.advance_commit_index();
        Ok(())
    }

    /// Accept `leader_id` as the leader of the current term
    pub(crate) fn record_leader(&mut self, leader_id: NodeId) {
        if self.role != Role::Follower {
            tracing::info!(id = self.id, term = self.current_term, leader_id, "found leader of current term, stepping down");
        }
        self.role = Role::Follower;
        self.leader_id = Some(leader_id);
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.last_contact = Instant::now();
    }

    pub(crate) fn grant_vote(&mut self, candidate: NodeId) -> Result<(), RaftError> {
        self.storage.save_term_and_vote(self.current_term, Some(candidate))?;
        self.voted_for = Some(candidate);
        self.touch();
        Ok(())
    }

    // -- commit advancer --

    pub(crate) fn set_commit_index(&mut self, index: u64) -> bool {
        if index <= self.commit_index {
            return false;
        }
        self.commit_index = index;
        self.commit_tx.send_replace(index);
        true
    }

    /// Raise the commit index to the highest entry of the current term that a
    /// majority (this leader included) has replicated. Entries from earlier
    /// terms only commit indirectly, underneath such an entry.
    pub fn advance_commit_index(&mut self) -> bool {
        if self.role != Role::Leader {
            return false;
        }
        let quorum = self.quorum_size();
        for n in ((self.commit_index + 1)..=self.log.last_index()).rev() {
            match self.log.term_at(n) {
                Some(term) if term == self.current_term => {}
                // terms only grow along the log
                Some(term) if term < self.current_term => break,
                _ => continue,
            }
            let replicated = 1 + self.match_index.values().filter(|&&m| m >= n).count();
            if replicated >= quorum {
                tracing::debug!(id = self.id, term = self.current_term, commit_index = n, "commit index advanced");
                return self.set_commit_index(n);
            }
        }
        false
    }

    // -- leader progress --

    pub(crate) fn record_replicated(&mut self, peer: NodeId, next: u64) {
        self.next_index.insert(peer, next);
        let matched = self.match_index.entry(peer).or_insert(0);
        *matched = (*matched).max(next.saturating_sub(1));
    }

    pub(crate) fn set_next_index(&mut self, peer: NodeId, next: u64) {
        self.next_index.insert(peer, next);
    }

    pub(crate) fn finish_snapshot(&mut self, peer: NodeId, last_included_index: u64) {
        self.installing_snapshot.remove(&peer);
        self.record_replicated(peer, last_included_index + 1);
    }

    /// Release the in-flight guard after a failed snapshot transfer so the
    /// next heartbeat can try again
    pub(crate) fn abort_snapshot(&mut self, peer: NodeId) {
        self.installing_snapshot.remove(&peer);
    }

    // -- request builders --

    pub fn vote_request(&self) -> RequestVoteRequest {
        RequestVoteRequest {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        }
    }

    /// Decide what to send `peer` next. `None` when we are not leader or a
    /// snapshot transfer to that peer is already in flight.
    pub fn prepare_replication(&mut self, peer: NodeId) -> Option<Outbound> {
        if self.role != Role::Leader || self.installing_snapshot.contains(&peer) {
            return None;
        }
        let last_index = self.log.last_index();
        let next = self
            .next_index(peer)
            .unwrap_or(last_index + 1)
            .clamp(1, last_index + 1);

        if next <= self.log.snapshot_meta().last_included_index {
            return self.prepare_snapshot(peer).map(Outbound::Snapshot);
        }
        let prev_log_index = next - 1;
        let Some(prev_log_term) = self.log.term_at(prev_log_index) else {
            return self.prepare_snapshot(peer).map(Outbound::Snapshot);
        };

        Some(Outbound::Append(AppendEntriesRequest {
            term: self.current_term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term,
            entries: self.log.entries_from(next),
            leader_commit: self.commit_index,
        }))
    }

    /// Mark a snapshot transfer to `peer` as in flight and build its request
    pub fn prepare_snapshot(&mut self, peer: NodeId) -> Option<InstallSnapshotRequest> {
        if self.role != Role::Leader || !self.installing_snapshot.insert(peer) {
            return None;
        }
        let meta = self.log.snapshot_meta();
        tracing::debug!(id = self.id, peer, last_included_index = meta.last_included_index, "sending snapshot");
        Some(InstallSnapshotRequest {
            term: self.current_term,
            leader_id: self.id,
            last_included_index: meta.last_included_index,
            last_included_term: meta.last_included_term,
            data: self.log.snapshot_data().to_vec(),
        })
    }

    // -- log mutation --

    // The in-memory log never runs ahead of storage: every mutation below is
    // written out first and applied to `self.log` only once that succeeded.

    /// Append a client command as leader and persist it
    pub fn append_command(&mut self, command: Vec<u8>) -> Result<LogEntry, RaftError> {
        if self.role != Role::Leader {
            return Err(RaftError::NotLeader {
                leader_hint: self.leader_id,
            });
        }
        let entry = LogEntry::new(self.current_term, self.log.last_index() + 1, command);
        self.storage.append_entries(std::slice::from_ref(&entry))?;
        self.log.push(entry.clone());
        self.advance_commit_index();
        Ok(entry)
    }

    /// Merge entries sent by the leader after a successful consistency check:
    /// skip what we already hold, truncate at the first conflict, append the rest.
    pub(crate) fn merge_entries(&mut self, entries: &[LogEntry]) -> Result<(), RaftError> {
        let snapshot_index = self.log.snapshot_meta().last_included_index;
        let mut conflict = None;
        let mut fresh_from = entries.len();
        for (i, entry) in entries.iter().enumerate() {
            if entry.index <= snapshot_index {
                continue;
            }
            match self.log.term_at(entry.index) {
                Some(term) if term == entry.term => continue,
                Some(_) => conflict = Some(entry.index),
                None => {}
            }
            fresh_from = i;
            break;
        }

        if let Some(index) = conflict {
            tracing::debug!(id = self.id, from_index = index, "truncating conflicting entries");
            self.storage.truncate_log_from(index)?;
            self.log.truncate_from(index);
        }
        let fresh = &entries[fresh_from..];
        if !fresh.is_empty() {
            self.storage.append_entries(fresh)?;
            for entry in fresh {
                self.log.push(entry.clone());
            }
        }
        Ok(())
    }

    /// Fold the applied prefix up to `index` into a snapshot
    pub fn compact(&mut self, index: u64, data: Vec<u8>) -> Result<SnapshotMeta, RaftError> {
        if index > self.commit_index {
            return Err(RaftError::SnapshotOutOfRange {
                index,
                last_index: self.commit_index,
            });
        }
        let current = self.log.snapshot_meta();
        if index <= current.last_included_index {
            return Ok(current);
        }
        let last_included_term = self.log.term_at(index).ok_or(RaftError::SnapshotOutOfRange {
            index,
            last_index: self.log.last_index(),
        })?;
        let meta = SnapshotMeta {
            last_included_index: index,
            last_included_term,
        };
        self.storage.save_snapshot(meta, &data)?;
        self.log.compact(index, data)?;
        tracing::info!(id = self.id, last_included_index = meta.last_included_index, "log compacted");
        Ok(meta)
    }

    /// Replace our log prefix with a snapshot from the leader
    pub(crate) fn install_snapshot(&mut self, meta: SnapshotMeta, data: Vec<u8>) -> Result<(), RaftError> {
        let boundary = meta.last_included_index;
        let keeps_suffix =
            self.log.term_at(boundary) == Some(meta.last_included_term) && self.log.last_index() > boundary;
        self.storage.save_snapshot(meta, &data)?;
        if !keeps_suffix {
            self.storage.truncate_log_from(boundary + 1)?;
        }
        let kept_suffix = self.log.install_snapshot(meta, data);
        self.set_commit_index(meta.last_included_index);
        tracing::info!(id = self.id, last_included_index = meta.last_included_index, kept_suffix, "installed snapshot");
        Ok(())
    }
}
