//! # node
//!
//! why: drive the protocol from timeouts and rpc replies on top of a shared, locked RaftState
//! relations: owns a Transport for outbound rpcs, delegates every state change to handlers/
//! what: RaftNode handle, follower rpc entry points, client proposals, snapshots
//!
//! Network i/o never happens while the state lock is held: requests are built
//! under the lock, sent without it, and replies re-acquire it.

mod election;
mod replication;
mod timer;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::RaftConfig;
use crate::error::{RaftError, RpcError};
use crate::handlers;
use crate::log::SnapshotMeta;
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    RequestVoteRequest, RequestVoteResponse,
};
use crate::state::{NodeId, NodeStatus, RaftState};
use crate::storage::Storage;
use crate::transport::Transport;

/// Cheaply cloneable handle to one Raft participant
pub struct RaftNode<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    id: NodeId,
    peers: Vec<NodeId>,
    config: RaftConfig,
    state: Mutex<RaftState>,
    transport: T,
    shutdown: CancellationToken,
}

impl<T: Transport> Clone for RaftNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> RaftNode<T> {
    /// Create a node, restoring any state `storage` already holds.
    /// `cluster` lists every member, this node included.
    pub fn new(
        id: NodeId,
        cluster: &[NodeId],
        config: RaftConfig,
        transport: T,
        storage: Box<dyn Storage>,
    ) -> Result<Self, RaftError> {
        config.validate()?;
        let state = RaftState::restore(id, cluster, storage)?;
        let peers = state.peers().to_vec();
        Ok(Self {
            inner: Arc::new(Inner {
                id,
                peers,
                config,
                state: Mutex::new(state),
                transport,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn config(&self) -> &RaftConfig {
        &self.inner.config
    }

    pub async fn status(&self) -> NodeStatus {
        self.inner.state.lock().await.status()
    }

    /// Run `f` against the locked state. Keep `f` short: every rpc handler
    /// waits on the same lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&RaftState) -> R) -> R {
        f(&*self.inner.state.lock().await)
    }

    /// Observe commit index advances; this is the apply loop's wake-up signal
    pub async fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.inner.state.lock().await.subscribe_commit()
    }

    // -- follower-side rpc entry points --

    pub async fn handle_request_vote(&self, req: RequestVoteRequest) -> Result<RequestVoteResponse, RaftError> {
        let mut state = self.inner.state.lock().await;
        handlers::handle_request_vote(&mut state, &req)
    }

    pub async fn handle_append_entries(&self, req: AppendEntriesRequest) -> Result<AppendEntriesResponse, RaftError> {
        let mut state = self.inner.state.lock().await;
        handlers::handle_append_entries(&mut state, &req)
    }

    pub async fn handle_install_snapshot(
        &self,
        req: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse, RaftError> {
        let mut state = self.inner.state.lock().await;
        handlers::handle_install_snapshot(&mut state, &req)
    }

    // -- client surface --

    /// Append `command` to the leader's log and start replicating it.
    /// Returns the `(index, term)` the entry was stored at.
    pub async fn propose(&self, command: Vec<u8>) -> Result<(u64, u64), RaftError> {
        let entry = self.inner.state.lock().await.append_command(command)?;
        tracing::debug!(id = self.inner.id, index = entry.index, term = entry.term, "proposed entry");
        self.handle_heartbeat_timeout();
        Ok((entry.index, entry.term))
    }

    /// Replace the log prefix up to `index` (already applied by the caller)
    /// with `data`
    pub async fn compact(&self, index: u64, data: Vec<u8>) -> Result<SnapshotMeta, RaftError> {
        self.inner.state.lock().await.compact(index, data)
    }

    /// Wait until the commit index reaches `index`, or `timeout` elapses.
    /// Returns the commit index observed last.
    pub async fn wait_for_commit(&self, index: u64, timeout: Duration) -> u64 {
        let mut commits = self.subscribe_commits().await;
        if tokio::time::timeout(timeout, commits.wait_for(|&c| c >= index))
            .await
            .is_err()
        {
            tracing::debug!(id = self.inner.id, index, "timed out waiting for commit");
        }
        let commit = *commits.borrow();
        commit
    }

    /// Send one rpc with the configured deadline
    async fn call<R, F>(&self, peer: NodeId, rpc: F) -> Result<R, RpcError>
    where
        F: std::future::Future<Output = Result<R, RpcError>>,
    {
        tokio::time::timeout(self.inner.config.rpc_timeout(), rpc)
            .await
            .unwrap_or(Err(RpcError::Timeout(peer)))
    }
}
