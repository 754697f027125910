//! Votes and quorum certificates.

use crate::{signing, Hash, KeyPair, PeerId, PublicKey, SessionId, Signature, Topology, View};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase a vote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteKind {
    /// First round: the proposal is valid and does not conflict with a lock.
    Prepare,
    /// Second round: a prepare QC was seen and the voter locked on it.
    Commit,
}

impl VoteKind {
    /// Byte used in the signing message.
    pub fn tag(self) -> u8 {
        match self {
            VoteKind::Prepare => 0,
            VoteKind::Commit => 1,
        }
    }
}

/// A peer's signed vote on a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub session: SessionId,
    pub view: View,
    pub height: u64,
    pub kind: VoteKind,
    pub proposal_hash: Hash,
    pub voter: PeerId,
    pub signature: Signature,
}

impl Vote {
    /// Create and sign a vote.
    pub fn new_signed(
        session: SessionId,
        view: View,
        height: u64,
        kind: VoteKind,
        proposal_hash: Hash,
        signer: &KeyPair,
    ) -> Self {
        let message = signing::vote_message(&session, view, height, kind, &proposal_hash);
        Self {
            session,
            view,
            height,
            kind,
            proposal_hash,
            voter: signer.peer_id(),
            signature: signer.sign(&message),
        }
    }

    /// Get the message that was signed.
    pub fn signing_message(&self) -> Vec<u8> {
        signing::vote_message(
            &self.session,
            self.view,
            self.height,
            self.kind,
            &self.proposal_hash,
        )
    }

    /// Verify the signature against the voter's key.
    pub fn verify_signature(&self, public_key: &PublicKey) -> bool {
        public_key.verify(&self.signing_message(), &self.signature)
    }
}

/// Proof that a quorum of peers cast the same vote.
///
/// Immutable once formed. Signatures are individual (no aggregation), keyed
/// by signer so duplicates cannot inflate the count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    pub session: SessionId,
    pub view: View,
    pub height: u64,
    pub kind: VoteKind,
    pub proposal_hash: Hash,
    pub signatures: BTreeMap<PeerId, Signature>,
}

impl QuorumCertificate {
    /// The implicit commit certificate every session starts from.
    pub fn genesis(session: SessionId) -> Self {
        Self {
            session,
            view: View::GENESIS,
            height: 0,
            kind: VoteKind::Commit,
            proposal_hash: Hash::ZERO,
            signatures: BTreeMap::new(),
        }
    }

    /// Whether this is the genesis certificate.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
            && self.view == View::GENESIS
            && self.kind == VoteKind::Commit
            && self.proposal_hash.is_zero()
            && self.signatures.is_empty()
    }

    /// Number of distinct signers.
    pub fn signer_count(&self) -> usize {
        self.signatures.len()
    }

    /// Get the message every signer signed.
    pub fn signing_message(&self) -> Vec<u8> {
        signing::vote_message(
            &self.session,
            self.view,
            self.height,
            self.kind,
            &self.proposal_hash,
        )
    }

    /// Verify signer count and every signature against the topology.
    ///
    /// The genesis certificate carries no signatures and always verifies.
    pub fn verify(&self, topology: &dyn Topology, threshold: usize) -> Result<(), QcError> {
        if self.is_genesis() {
            return Ok(());
        }

        if self.signatures.len() < threshold {
            return Err(QcError::InsufficientSigners {
                have: self.signatures.len(),
                need: threshold,
            });
        }

        let message = self.signing_message();
        for (signer, signature) in &self.signatures {
            let key = topology
                .public_key(signer)
                .ok_or(QcError::UnknownSigner(*signer))?;
            if !key.verify(&message, signature) {
                return Err(QcError::InvalidSignature(*signer));
            }
        }
        Ok(())
    }
}

/// Reasons a quorum certificate is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QcError {
    #[error("QC has {have} signers, needs {need}")]
    InsufficientSigners { have: usize, need: usize },

    #[error("QC signer {0:?} is not a configured peer")]
    UnknownSigner(PeerId),

    #[error("QC signature from {0:?} does not verify")]
    InvalidSignature(PeerId),
}
