//! # raft-core
//!
//! why: implement the event-driven core of a raft node in portable rust
//! relations: persisted through raft-storage, talks to peers through any Transport implementation
//! what: role/term state, log, rpc reducers, election and replication coordinators, timers

pub mod config;
pub mod error;
pub mod handlers;
pub mod log;
pub mod message;
pub mod node;
pub mod state;
pub mod storage;
pub mod transport;

pub use config::RaftConfig;
pub use error::{RaftError, RpcError};
pub use handlers::{AppendOutcome, Directive};
pub use log::{LogEntry, RaftLog, SnapshotMeta};
pub use message::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    Outbound, RequestVoteRequest, RequestVoteResponse,
};
pub use node::RaftNode;
pub use state::{NodeId, NodeStatus, RaftState, Role};
pub use storage::Storage;
pub use transport::Transport;
