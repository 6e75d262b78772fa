//! Election and heartbeat timers.
//!
//! One election detector runs per started node. When it fires it hands the
//! election to its own task and rearms at once, so the next detector is
//! already counting while votes are outstanding.

use std::time::Duration;

use rand::Rng;

use super::RaftNode;
use crate::config::RaftConfig;
use crate::state::Role;
use crate::transport::Transport;

/// Generates a random election timeout within the configured range
pub fn random_election_timeout(config: &RaftConfig) -> Duration {
    let timeout_ms = rand::rng().random_range(config.election_timeout_range());
    Duration::from_millis(timeout_ms)
}

impl<T: Transport> RaftNode<T> {
    /// Start the election detector and the heartbeat ticker
    pub fn start(&self) {
        tracing::info!(id = self.inner.id, peers = ?self.inner.peers, "starting raft node");
        let node = self.clone();
        tokio::spawn(async move { node.run_election_timer().await });

        let node = self.clone();
        tokio::spawn(async move { node.run_heartbeat_ticker().await });
    }

    /// Stop all timers. In-flight rpcs still complete and are reduced as usual.
    pub fn shutdown(&self) {
        tracing::info!(id = self.inner.id, "shutting down raft node");
        self.inner.shutdown.cancel();
    }

    async fn run_election_timer(&self) {
        loop {
            let timeout = random_election_timeout(&self.inner.config);
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(timeout) => {}
            }

            let expired = {
                let state = self.inner.state.lock().await;
                state.role() != Role::Leader && state.last_contact().elapsed() >= timeout
            };
            if expired {
                let node = self.clone();
                tokio::spawn(async move { node.handle_election_timeout().await });
            }
        }
    }

    async fn run_heartbeat_ticker(&self) {
        let mut ticker = tokio::time::interval(self.inner.config.heartbeat_interval());
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let is_leader = self.inner.state.lock().await.role() == Role::Leader;
            if is_leader {
                self.handle_heartbeat_timeout();
            }
        }
    }
}
