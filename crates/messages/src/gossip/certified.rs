//! Certified proposals: a proposal together with a quorum certificate on it.

use gambit_types::{NetworkMessage, Proposal, QuorumCertificate, SessionId, VoteKind};
use serde::{Deserialize, Serialize};

/// A proposal with its prepare QC. Receivers lock on it and send a commit vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedGossip {
    pub proposal: Proposal,
    pub qc: QuorumCertificate,
}

impl PreparedGossip {
    /// Create a new prepared message.
    pub fn new(proposal: Proposal, qc: QuorumCertificate) -> Self {
        Self { proposal, qc }
    }

    /// Session the proposal belongs to.
    pub fn session_id(&self) -> SessionId {
        self.proposal.session
    }

    /// Whether the QC is a prepare QC for exactly this proposal.
    pub fn is_consistent(&self) -> bool {
        self.qc.kind == VoteKind::Prepare && certifies(&self.qc, &self.proposal)
    }
}

impl NetworkMessage for PreparedGossip {
    fn message_type_id() -> &'static str {
        "consensus.prepared"
    }
}

/// A proposal with its commit QC. Receivers apply the move.
///
/// Also replayed point-to-point in answer to a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitGossip {
    pub proposal: Proposal,
    pub qc: QuorumCertificate,
}

impl CommitGossip {
    /// Create a new commit message.
    pub fn new(proposal: Proposal, qc: QuorumCertificate) -> Self {
        Self { proposal, qc }
    }

    /// Session the proposal belongs to.
    pub fn session_id(&self) -> SessionId {
        self.proposal.session
    }

    /// Whether the QC is a commit QC for exactly this proposal.
    pub fn is_consistent(&self) -> bool {
        self.qc.kind == VoteKind::Commit && certifies(&self.qc, &self.proposal)
    }
}

impl NetworkMessage for CommitGossip {
    fn message_type_id() -> &'static str {
        "consensus.commit"
    }
}

fn certifies(qc: &QuorumCertificate, proposal: &Proposal) -> bool {
    qc.session == proposal.session
        && qc.view == proposal.view
        && qc.height == proposal.height
        && qc.proposal_hash == proposal.hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_test_helpers::{signed_move, test_peers, test_players};
    use gambit_types::{Vote, View};

    fn certified(kind: VoteKind) -> (Proposal, QuorumCertificate) {
        let (white, black) = test_players();
        let peers = test_peers(4);
        let tx = signed_move(&white, &black, &white, None, "e2", "e4");
        let genesis = QuorumCertificate::genesis(tx.session_id());
        let proposal = Proposal::new_signed(View(1), 1, genesis, None, tx, &peers[1]);

        let signatures = peers[..3]
            .iter()
            .map(|k| {
                let vote = Vote::new_signed(
                    proposal.session,
                    proposal.view,
                    proposal.height,
                    kind,
                    proposal.hash(),
                    k,
                );
                (vote.voter, vote.signature)
            })
            .collect();
        let qc = QuorumCertificate {
            session: proposal.session,
            view: proposal.view,
            height: proposal.height,
            kind,
            proposal_hash: proposal.hash(),
            signatures,
        };
        (proposal, qc)
    }

    #[test]
    fn test_consistency_checks_kind() {
        let (proposal, qc) = certified(VoteKind::Prepare);
        assert!(PreparedGossip::new(proposal.clone(), qc.clone()).is_consistent());
        assert!(!CommitGossip::new(proposal, qc).is_consistent());

        let (proposal, qc) = certified(VoteKind::Commit);
        assert!(CommitGossip::new(proposal, qc).is_consistent());
    }

    #[test]
    fn test_consistency_checks_proposal() {
        let (mut proposal, qc) = certified(VoteKind::Commit);
        proposal.view = View(2);
        assert!(!CommitGossip::new(proposal, qc).is_consistent());
    }
}
