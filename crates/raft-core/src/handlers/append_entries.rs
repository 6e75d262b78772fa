use crate::error::RaftError;
use crate::message::{AppendEntriesRequest, AppendEntriesResponse};
use crate::state::{NodeId, RaftState, Role};

/// What the replication coordinator should do after an AppendEntries reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Reply applied, nothing more to send right now
    Ok,
    /// `next_index` moved back; resend to this peer immediately
    Retry,
    /// The peer needs entries we only hold as a snapshot
    InstallSnapshot,
    /// Reply belongs to an older term; ignored
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub directive: Directive,
    pub commit_advanced: bool,
}

impl AppendOutcome {
    fn of(directive: Directive) -> Self {
        Self {
            directive,
            commit_advanced: false,
        }
    }
}

/// Answer a leader's AppendEntries.
///
/// On a consistency-check failure the reply carries hints (see
/// `AppendEntriesResponse`) so the leader can jump back a whole term at a time.
pub fn handle_append_entries(
    state: &mut RaftState,
    req: &AppendEntriesRequest,
) -> Result<AppendEntriesResponse, RaftError> {
    state.update_term(req.term)?;

    let term = state.current_term();
    if req.term < term {
        return Ok(AppendEntriesResponse::rejected(term));
    }
    state.record_leader(req.leader_id);

    let log = state.log();
    let snapshot_index = log.snapshot_meta().last_included_index;

    // everything up to our snapshot is committed; ask for what follows it
    if req.prev_log_index < snapshot_index {
        return Ok(AppendEntriesResponse {
            follower_log_len: Some(snapshot_index + 1),
            ..AppendEntriesResponse::rejected(term)
        });
    }

    if req.prev_log_index > log.last_index() {
        return Ok(AppendEntriesResponse {
            follower_log_len: Some(log.last_index() + 1),
            ..AppendEntriesResponse::rejected(term)
        });
    }

    match log.term_at(req.prev_log_index) {
        Some(prev_term) if prev_term == req.prev_log_term => {}
        Some(conflict_term) => {
            return Ok(AppendEntriesResponse {
                conflict_term: Some(conflict_term),
                conflict_index: log.first_index_of_term(conflict_term, req.prev_log_index),
                ..AppendEntriesResponse::rejected(term)
            });
        }
        None => {
            return Ok(AppendEntriesResponse {
                follower_log_len: Some(log.last_index() + 1),
                ..AppendEntriesResponse::rejected(term)
            });
        }
    }

    state.merge_entries(&req.entries)?;

    let last_new_index = req.prev_log_index + req.entries.len() as u64;
    state.set_commit_index(req.leader_commit.min(last_new_index));

    Ok(AppendEntriesResponse::accepted(term))
}

/// Reduce an AppendEntries reply from `peer`.
///
/// On success the peer's progress moves forward and the commit index is
/// recomputed. On failure `next_index` jumps back using the follower's hints;
/// if it lands inside our snapshot the peer has to be sent the snapshot instead.
pub fn handle_append_entries_response(
    state: &mut RaftState,
    peer: NodeId,
    req: &AppendEntriesRequest,
    resp: &AppendEntriesResponse,
) -> Result<AppendOutcome, RaftError> {
    state.update_term(resp.term)?;

    if req.term != state.current_term() || state.role() != Role::Leader {
        return Ok(AppendOutcome::of(Directive::Stale));
    }

    if resp.success {
        let next = req.prev_log_index + req.entries.len() as u64 + 1;
        state.record_replicated(peer, next);
        let commit_advanced = state.advance_commit_index();
        return Ok(AppendOutcome {
            directive: Directive::Ok,
            commit_advanced,
        });
    }

    let next = match (resp.follower_log_len, resp.conflict_term) {
        (Some(len), _) => len,
        (None, Some(conflict_term)) => state
            .log()
            .last_entry_by_term(conflict_term)
            .map(|entry| entry.index)
            .unwrap_or(resp.conflict_index),
        (None, None) => resp.conflict_index,
    }
    .max(1);
    state.set_next_index(peer, next);

    let snapshot_index = state.log().snapshot_meta().last_included_index;
    if next <= snapshot_index {
        tracing::debug!(id = state.id(), peer, next_index = next, snapshot_index, "peer is behind our snapshot");
        return Ok(AppendOutcome::of(Directive::InstallSnapshot));
    }

    tracing::debug!(id = state.id(), peer, next_index = next, "backing off");
    Ok(AppendOutcome::of(Directive::Retry))
}
