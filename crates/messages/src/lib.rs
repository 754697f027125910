//! Network messages for the consensus protocol.
//!
//! Every message names its game session, so one peer set can run many games
//! side by side over the same transport.

pub mod gossip;
pub mod request;

// Re-export commonly used types
pub use gossip::{
    CommitGossip, GameStartGossip, PreparedGossip, ProposalGossip, TransactionGossip,
    ViewChangeGossip, VoteGossip,
};
pub use request::SyncRequest;
