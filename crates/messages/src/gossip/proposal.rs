//! Proposal gossip message.

use gambit_types::{NetworkMessage, Proposal};
use serde::{Deserialize, Serialize};

/// A leader's proposal, broadcast once per view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalGossip {
    pub proposal: Proposal,
}

impl ProposalGossip {
    /// Create a new proposal gossip message.
    pub fn new(proposal: Proposal) -> Self {
        Self { proposal }
    }

    /// Get the inner proposal.
    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// Consume and return the inner proposal.
    pub fn into_proposal(self) -> Proposal {
        self.proposal
    }
}

impl NetworkMessage for ProposalGossip {
    fn message_type_id() -> &'static str {
        "consensus.proposal"
    }
}
