//! Log replication and snapshot catch-up.
//!
//! Every peer gets its own task per round. A task keeps resending to its peer
//! while the reply says "retry" and hands off to a snapshot transfer when the
//! peer has fallen behind the compacted prefix.

use super::RaftNode;
use crate::handlers::{self, Directive};
use crate::message::{InstallSnapshotRequest, Outbound};
use crate::state::NodeId;
use crate::transport::Transport;

impl<T: Transport> RaftNode<T> {
    /// React to a heartbeat timeout: push log state to every peer.
    /// Does nothing unless this node is leader.
    pub fn handle_heartbeat_timeout(&self) {
        for &peer in &self.inner.peers {
            self.spawn_replication(peer);
        }
    }

    /// Single-peer replication round, run in the background
    pub fn spawn_replication(&self, peer: NodeId) {
        let node = self.clone();
        tokio::spawn(async move { node.replicate_to(peer).await });
    }

    fn spawn_snapshot_transfer(&self, peer: NodeId, request: InstallSnapshotRequest) {
        let node = self.clone();
        tokio::spawn(async move { node.send_snapshot(peer, request).await });
    }

    /// Send AppendEntries to `peer` until it stops asking for a retry
    #[tracing::instrument(skip(self), fields(node_id = self.inner.id))]
    pub async fn replicate_to(&self, peer: NodeId) {
        loop {
            let outbound = self.inner.state.lock().await.prepare_replication(peer);
            let request = match outbound {
                None => return,
                Some(Outbound::Snapshot(request)) => {
                    self.spawn_snapshot_transfer(peer, request);
                    return;
                }
                Some(Outbound::Append(request)) => request,
            };

            let response = match self
                .call(peer, self.inner.transport.append_entries(peer, request.clone()))
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(peer, error = %e, "append_entries failed");
                    return;
                }
            };

            let mut state = self.inner.state.lock().await;
            let outcome = match handlers::handle_append_entries_response(&mut state, peer, &request, &response) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(peer, error = %e, "failed to process append_entries response");
                    return;
                }
            };

            match outcome.directive {
                Directive::Retry => continue,
                Directive::InstallSnapshot => {
                    if let Some(request) = state.prepare_snapshot(peer) {
                        drop(state);
                        self.spawn_snapshot_transfer(peer, request);
                    }
                    return;
                }
                Directive::Ok | Directive::Stale => return,
            }
        }
    }

    /// Ship our snapshot to `peer`, then follow up with whatever entries were
    /// written after it was taken
    async fn send_snapshot(&self, peer: NodeId, request: InstallSnapshotRequest) {
        let response = match self
            .call(peer, self.inner.transport.install_snapshot(peer, request.clone()))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(peer, error = %e, "install_snapshot failed");
                self.inner.state.lock().await.abort_snapshot(peer);
                return;
            }
        };

        {
            let mut state = self.inner.state.lock().await;
            if let Err(e) = handlers::handle_install_snapshot_response(&mut state, peer, &request, &response) {
                tracing::warn!(peer, error = %e, "failed to process install_snapshot response");
            }
        }
        self.spawn_replication(peer);
    }
}
