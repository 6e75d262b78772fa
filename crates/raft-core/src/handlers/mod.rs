//! # handlers
//!
//! why: turn one rpc (or one rpc reply) plus the current state into a state change and a directive
//! relations: run by node/ while holding the state lock; never perform i/o other than Storage
//! what: follower-side request handlers and leader-side response reducers, one file per rpc
//!
//! Every function here reconciles the term first, then checks whether the
//! message still belongs to the current term, and only then mutates.

mod append_entries;
mod install_snapshot;
mod vote;

pub use append_entries::{handle_append_entries, handle_append_entries_response, AppendOutcome, Directive};
pub use install_snapshot::{handle_install_snapshot, handle_install_snapshot_response};
pub use vote::{handle_request_vote, handle_vote_response};
