//! # error
//!
//! why: give callers of the core a typed view of the few failures that can escape it
//! relations: returned by state.rs transitions, storage calls and node.rs entry points
//! what: RaftError for local failures, RpcError for transport failures

use crate::state::{NodeId, Role};

/// Failures raised by the local node.
///
/// Protocol-level conditions (stale replies, log divergence, unreachable
/// peers) are never reported here; they degrade to a retry or a no-op.
#[derive(Debug, thiserror::Error)]
pub enum RaftError {
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid role transition from {from} to {to}")]
    InvalidTransition { from: Role, to: Role },

    #[error("not the leader (leader hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<NodeId> },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("snapshot index {index} is beyond the usable log (last index {last_index})")]
    SnapshotOutOfRange { index: u64, last_index: u64 },
}

/// Failures of a single outbound rpc. Every variant is treated by the
/// coordinators as "no vote" or "no effect".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("peer {0} is unreachable")]
    Unreachable(NodeId),

    #[error("rpc to peer {0} timed out")]
    Timeout(NodeId),

    #[error("transport error: {0}")]
    Transport(String),
}
