//! Vote message.

use gambit_types::{NetworkMessage, Vote};
use serde::{Deserialize, Serialize};

/// A prepare or commit vote, sent to the leader of the vote's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteGossip {
    pub vote: Vote,
}

impl VoteGossip {
    /// Create a new vote message.
    pub fn new(vote: Vote) -> Self {
        Self { vote }
    }

    /// Get the inner vote.
    pub fn vote(&self) -> &Vote {
        &self.vote
    }

    /// Consume and return the inner vote.
    pub fn into_vote(self) -> Vote {
        self.vote
    }
}

impl NetworkMessage for VoteGossip {
    fn message_type_id() -> &'static str {
        "consensus.vote"
    }
}
