use crate::error::RaftError;
use crate::message::{RequestVoteRequest, RequestVoteResponse};
use crate::state::RaftState;

/// Answer a candidate's RequestVote.
///
/// The vote is granted at most once per term, and only to a candidate whose
/// log is at least as up to date as ours.
pub fn handle_request_vote(
    state: &mut RaftState,
    req: &RequestVoteRequest,
) -> Result<RequestVoteResponse, RaftError> {
    state.update_term(req.term)?;

    let term = state.current_term();
    if req.term < term {
        return Ok(RequestVoteResponse {
            term,
            vote_granted: false,
        });
    }

    let free_to_vote = state
        .voted_for()
        .map_or(true, |voted| voted == req.candidate_id);
    let log = state.log();
    let up_to_date = req.last_log_term > log.last_term()
        || (req.last_log_term == log.last_term() && req.last_log_index >= log.last_index());

    let vote_granted = free_to_vote && up_to_date;
    if vote_granted {
        state.grant_vote(req.candidate_id)?;
    }
    tracing::debug!(
        id = state.id(),
        term,
        candidate_id = req.candidate_id,
        vote_granted,
        "handled vote request"
    );

    Ok(RequestVoteResponse { term, vote_granted })
}

/// Reduce a RequestVote reply into "granted and still relevant".
///
/// A reply from an older round, or one that revealed a newer term, never
/// counts as a vote.
pub fn handle_vote_response(
    state: &mut RaftState,
    req: &RequestVoteRequest,
    resp: &RequestVoteResponse,
) -> Result<bool, RaftError> {
    state.update_term(resp.term)?;

    if state.current_term() != req.term {
        return Ok(false);
    }
    Ok(resp.vote_granted)
}
