//! Leader proposals.

use crate::{
    signing, Hash, KeyPair, PeerId, PublicKey, QuorumCertificate, SessionId, Signature,
    Transaction, View,
};
use serde::{Deserialize, Serialize};

/// A leader's proposal of the next move for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub session: SessionId,
    pub view: View,

    /// Number of committed moves this proposal builds on, plus one.
    pub height: u64,

    /// Commit certificate for the previous height (genesis for the first move).
    pub parent_qc: QuorumCertificate,

    /// Prepare certificate for this height from an earlier view, when the
    /// leader re-proposes a locked transaction.
    pub justify: Option<QuorumCertificate>,

    pub transaction: Transaction,
    pub proposer: PeerId,
    pub signature: Signature,
}

impl Proposal {
    /// Create and sign a proposal.
    pub fn new_signed(
        view: View,
        height: u64,
        parent_qc: QuorumCertificate,
        justify: Option<QuorumCertificate>,
        transaction: Transaction,
        signer: &KeyPair,
    ) -> Self {
        let mut proposal = Self {
            session: parent_qc.session,
            view,
            height,
            parent_qc,
            justify,
            transaction,
            proposer: signer.peer_id(),
            signature: Signature::zero(),
        };
        proposal.signature = signer.sign(&proposal.signing_message());
        proposal
    }

    /// Get the message that was signed.
    pub fn signing_message(&self) -> Vec<u8> {
        signing::proposal_message(
            &self.session,
            self.view,
            self.height,
            &self.parent_qc,
            self.justify.as_ref(),
            &self.transaction.hash(),
            &self.proposer,
        )
    }

    /// Hash identifying this proposal; what votes and QCs refer to.
    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.signing_message())
    }

    /// Verify the proposer's signature.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        public_key.verify(&self.signing_message(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MoveAction, Position};

    fn fixture() -> (KeyPair, Proposal) {
        let white = KeyPair::from_seed(&[1u8; 32]);
        let black = KeyPair::from_seed(&[2u8; 32]);
        let leader = KeyPair::from_seed(&[3u8; 32]);
        let tx = Transaction::new_signed(
            white.public_key(),
            black.public_key(),
            None,
            MoveAction::new(Position::new(1, 4), Position::new(3, 4)),
            &white,
        );
        let genesis = QuorumCertificate::genesis(tx.session_id());
        let proposal = Proposal::new_signed(View(1), 1, genesis, None, tx, &leader);
        (leader, proposal)
    }

    #[test]
    fn test_proposal_signature() {
        let (leader, proposal) = fixture();
        assert_eq!(proposal.proposer, leader.peer_id());
        assert!(proposal.verify_signature(&leader.public_key()));
    }

    #[test]
    fn test_hash_covers_view_and_transaction() {
        let (leader, proposal) = fixture();

        let mut later = proposal.clone();
        later.view = View(2);
        assert_ne!(proposal.hash(), later.hash());
        assert!(!later.verify_signature(&leader.public_key()));

        let mut other_move = proposal.clone();
        other_move.transaction.action.to = Position::new(2, 4);
        assert_ne!(proposal.hash(), other_move.hash());
    }

    #[test]
    fn test_hash_excludes_signature() {
        let (_, proposal) = fixture();
        let mut resigned = proposal.clone();
        resigned.signature = Signature::zero();
        assert_eq!(proposal.hash(), resigned.hash());
    }

    #[test]
    fn test_tampered_certificates_break_signature() {
        let (leader, proposal) = fixture();

        let mut taller_parent = proposal.clone();
        taller_parent.parent_qc.height = 7;
        assert_ne!(proposal.hash(), taller_parent.hash());
        assert!(!taller_parent.verify_signature(&leader.public_key()));

        let mut extra_signer = proposal.clone();
        extra_signer
            .parent_qc
            .signatures
            .insert(leader.peer_id(), Signature::zero());
        assert_ne!(proposal.hash(), extra_signer.hash());
        assert!(!extra_signer.verify_signature(&leader.public_key()));

        let mut with_justify = proposal.clone();
        with_justify.justify = Some(QuorumCertificate::genesis(proposal.session));
        assert!(!with_justify.verify_signature(&leader.public_key()));
    }
}
