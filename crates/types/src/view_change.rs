//! View change signals for liveness.

use crate::{
    signing, KeyPair, PeerId, Proposal, PublicKey, QuorumCertificate, SessionId, Signature, View,
};
use serde::{Deserialize, Serialize};

/// A proposal together with the prepare QC that locked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProposal {
    pub proposal: Proposal,
    pub qc: QuorumCertificate,
}

/// Signal that the sender timed out and moved to `new_view`.
///
/// Carries the sender's lock so the next leader can re-propose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChange {
    pub session: SessionId,

    /// View the sender is moving to.
    pub new_view: View,

    /// View of the highest commit QC the sender holds.
    pub highest_qc_view: View,

    pub locked: Option<LockedProposal>,
    pub sender: PeerId,
    pub signature: Signature,
}

impl ViewChange {
    /// Create and sign a view change signal.
    pub fn new_signed(
        session: SessionId,
        new_view: View,
        highest_qc_view: View,
        locked: Option<LockedProposal>,
        signer: &KeyPair,
    ) -> Self {
        let mut view_change = Self {
            session,
            new_view,
            highest_qc_view,
            locked,
            sender: signer.peer_id(),
            signature: Signature::zero(),
        };
        view_change.signature = signer.sign(&view_change.signing_message());
        view_change
    }

    /// Get the message that was signed.
    pub fn signing_message(&self) -> Vec<u8> {
        let locked_hash = self.locked.as_ref().map(|l| l.proposal.hash());
        signing::view_change_message(
            &self.session,
            self.new_view,
            self.highest_qc_view,
            locked_hash.as_ref(),
            &self.sender,
        )
    }

    /// Verify the sender's signature.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        public_key.verify(&self.signing_message(), &self.signature)
    }
}
