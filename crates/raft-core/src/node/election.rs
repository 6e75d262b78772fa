//! Leader election.
//!
//! A candidate asks every peer for a vote in parallel and stops waiting as
//! soon as either a majority has granted or every peer has answered.

use tokio::sync::mpsc;

use super::RaftNode;
use crate::handlers;
use crate::message::RequestVoteRequest;
use crate::state::{NodeId, Role};
use crate::transport::Transport;

impl<T: Transport> RaftNode<T> {
    /// React to an election timeout. Returns whether this node became leader.
    ///
    /// Arms no timer of its own: under `start()` the detector that fired keeps
    /// running, so an election that stalls is retried later.
    #[tracing::instrument(skip(self), fields(node_id = self.inner.id))]
    pub async fn handle_election_timeout(&self) -> bool {
        let (term, request) = {
            let mut state = self.inner.state.lock().await;
            match state.become_candidate() {
                Ok(term) => (term, state.vote_request()),
                Err(e) => {
                    tracing::debug!(error = %e, "election timeout ignored");
                    return false;
                }
            }
        };

        let cluster_size = self.inner.peers.len() + 1;
        let quorum = cluster_size / 2 + 1;

        let (tx, mut rx) = mpsc::unbounded_channel();
        for &peer in &self.inner.peers {
            let node = self.clone();
            let tx = tx.clone();
            let request = request.clone();
            tokio::spawn(async move {
                let granted = node.request_vote_from(peer, request).await;
                // the election may already be decided; late votes are dropped
                let _ = tx.send(granted);
            });
        }
        drop(tx);

        // our own vote
        let mut received = 1;
        let mut granted = 1;
        while received < cluster_size && granted < quorum {
            match rx.recv().await {
                Some(vote) => {
                    received += 1;
                    if vote {
                        granted += 1;
                    }
                }
                None => break,
            }
        }

        {
            let mut state = self.inner.state.lock().await;
            if state.current_term() != term || state.role() != Role::Candidate || granted <= cluster_size / 2 {
                tracing::info!(
                    term,
                    current_term = state.current_term(),
                    role = %state.role(),
                    granted,
                    received,
                    "election lost"
                );
                return false;
            }
            if let Err(e) = state.become_leader(term) {
                tracing::warn!(error = %e, "could not take leadership");
                return false;
            }
        }

        // assert leadership before any client traffic
        self.handle_heartbeat_timeout();
        true
    }

    /// Ask one peer for its vote; any failure counts as a refusal
    async fn request_vote_from(&self, peer: NodeId, request: RequestVoteRequest) -> bool {
        let response = self
            .call(peer, self.inner.transport.request_vote(peer, request.clone()))
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(peer, error = %e, "request_vote failed");
                return false;
            }
        };

        let mut state = self.inner.state.lock().await;
        match handlers::handle_vote_response(&mut state, &request, &response) {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(peer, error = %e, "failed to process vote response");
                false
            }
        }
    }
}
