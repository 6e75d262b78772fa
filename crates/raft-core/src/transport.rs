//! # transport
//!
//! why: keep the protocol core independent of how bytes reach a peer
//! relations: called by node/election.rs and node/replication.rs outside the state lock
//! what: Transport trait, one async method per raft rpc

use async_trait::async_trait;

use crate::error::RpcError;
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    RequestVoteRequest, RequestVoteResponse,
};
use crate::state::NodeId;

/// Outbound rpc channel to the rest of the cluster.
///
/// Implementations should resolve every call eventually; the node also wraps
/// each call in `RaftConfig::rpc_timeout`, so a hung call is reported as
/// `RpcError::Timeout`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request_vote(
        &self,
        peer: NodeId,
        req: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, RpcError>;

    async fn append_entries(
        &self,
        peer: NodeId,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse, RpcError>;

    async fn install_snapshot(
        &self,
        peer: NodeId,
        req: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse, RpcError>;
}
