use crate::error::RaftError;
use crate::log::SnapshotMeta;
use crate::message::{InstallSnapshotRequest, InstallSnapshotResponse};
use crate::state::{NodeId, RaftState};

/// Install a snapshot sent by the leader of the current term
pub fn handle_install_snapshot(
    state: &mut RaftState,
    req: &InstallSnapshotRequest,
) -> Result<InstallSnapshotResponse, RaftError> {
    state.update_term(req.term)?;

    let term = state.current_term();
    if req.term < term {
        return Ok(InstallSnapshotResponse { term });
    }
    state.record_leader(req.leader_id);

    // an older snapshot than the one we hold carries nothing new
    if req.last_included_index <= state.log().snapshot_meta().last_included_index {
        return Ok(InstallSnapshotResponse { term });
    }

    let meta = SnapshotMeta {
        last_included_index: req.last_included_index,
        last_included_term: req.last_included_term,
    };
    state.install_snapshot(meta, req.data.clone())?;
    Ok(InstallSnapshotResponse { term })
}

/// Reduce an InstallSnapshot reply: the peer now holds everything up to the
/// snapshot boundary. The caller follows up with a single-peer replication
/// round regardless of the outcome.
pub fn handle_install_snapshot_response(
    state: &mut RaftState,
    peer: NodeId,
    req: &InstallSnapshotRequest,
    resp: &InstallSnapshotResponse,
) -> Result<(), RaftError> {
    state.update_term(resp.term)?;

    if state.current_term() != req.term {
        return Ok(());
    }
    state.finish_snapshot(peer, req.last_included_index);
    tracing::debug!(
        id = state.id(),
        peer,
        match_index = req.last_included_index,
        "snapshot installed on peer"
    );
    Ok(())
}
