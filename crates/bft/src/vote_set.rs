//! Vote collection for one (view, kind).

use gambit_types::{Hash, PeerId, QuorumCertificate, SessionId, View, Vote, VoteKind};
use std::collections::BTreeMap;

/// Outcome of adding a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddVoteResult {
    /// New vote; `count` votes now back its proposal.
    Added { count: usize },

    /// Same voter, same proposal. Ignored.
    Duplicate,

    /// Same voter, different proposal. The first vote stands.
    Equivocation { previous: Hash },
}

/// Votes of one kind cast in one view.
///
/// Keyed by voter, so one peer contributes at most one vote however often it
/// repeats itself.
#[derive(Debug, Clone)]
pub struct VoteSet {
    session: SessionId,
    view: View,
    height: u64,
    kind: VoteKind,
    votes: BTreeMap<PeerId, Vote>,
    qc_formed: bool,
}

impl VoteSet {
    /// Create an empty set.
    pub fn new(session: SessionId, view: View, height: u64, kind: VoteKind) -> Self {
        Self {
            session,
            view,
            height,
            kind,
            votes: BTreeMap::new(),
            qc_formed: false,
        }
    }

    /// Add a vote whose signature the caller has verified.
    pub fn add_vote(&mut self, vote: Vote) -> AddVoteResult {
        debug_assert_eq!(vote.view, self.view);
        debug_assert_eq!(vote.kind, self.kind);

        if let Some(existing) = self.votes.get(&vote.voter) {
            if existing.proposal_hash == vote.proposal_hash {
                return AddVoteResult::Duplicate;
            }
            return AddVoteResult::Equivocation {
                previous: existing.proposal_hash,
            };
        }

        let hash = vote.proposal_hash;
        self.votes.insert(vote.voter, vote);
        AddVoteResult::Added {
            count: self.count_for(&hash),
        }
    }

    /// Number of votes for a proposal.
    pub fn count_for(&self, proposal_hash: &Hash) -> usize {
        self.votes
            .values()
            .filter(|vote| &vote.proposal_hash == proposal_hash)
            .count()
    }

    /// Whether a QC was already built from this set.
    pub fn qc_formed(&self) -> bool {
        self.qc_formed
    }

    /// Build a QC for `proposal_hash` once `threshold` votes back it.
    ///
    /// Returns None below threshold or if a QC was already built.
    pub fn try_build_qc(
        &mut self,
        proposal_hash: Hash,
        threshold: usize,
    ) -> Option<QuorumCertificate> {
        if self.qc_formed || self.count_for(&proposal_hash) < threshold {
            return None;
        }
        self.qc_formed = true;

        let signatures = self
            .votes
            .iter()
            .filter(|(_, vote)| vote.proposal_hash == proposal_hash)
            .map(|(voter, vote)| (*voter, vote.signature.clone()))
            .collect();

        Some(QuorumCertificate {
            session: self.session,
            view: self.view,
            height: self.height,
            kind: self.kind,
            proposal_hash,
            signatures,
        })
    }

    /// Number of distinct voters.
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    /// Check if no votes have been added.
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_types::{KeyPair, StaticTopology};

    fn keys() -> Vec<KeyPair> {
        (0..4u8).map(|i| KeyPair::from_seed(&[i + 1; 32])).collect()
    }

    fn session() -> SessionId {
        let white = KeyPair::from_seed(&[100; 32]).public_key();
        let black = KeyPair::from_seed(&[101; 32]).public_key();
        SessionId::for_players(&white, &black)
    }

    fn vote(signer: &KeyPair, hash: Hash) -> Vote {
        Vote::new_signed(session(), View(1), 1, VoteKind::Prepare, hash, signer)
    }

    #[test]
    fn test_quorum_forms_once() {
        let keys = keys();
        let hash = Hash::from_bytes(b"proposal");
        let mut set = VoteSet::new(session(), View(1), 1, VoteKind::Prepare);

        assert_eq!(set.add_vote(vote(&keys[0], hash)), AddVoteResult::Added { count: 1 });
        assert_eq!(set.add_vote(vote(&keys[1], hash)), AddVoteResult::Added { count: 2 });
        assert!(set.try_build_qc(hash, 3).is_none());

        assert_eq!(set.add_vote(vote(&keys[2], hash)), AddVoteResult::Added { count: 3 });
        let qc = set.try_build_qc(hash, 3).unwrap();
        assert_eq!(qc.signer_count(), 3);
        assert!(set.try_build_qc(hash, 3).is_none());

        let topology = StaticTopology::new(
            keys[0].peer_id(),
            keys.iter().map(|k| k.public_key()).collect(),
        )
        .unwrap();
        assert!(qc.verify(&topology, 3).is_ok());
    }

    #[test]
    fn test_duplicates_and_equivocation() {
        let keys = keys();
        let first = Hash::from_bytes(b"first");
        let second = Hash::from_bytes(b"second");
        let mut set = VoteSet::new(session(), View(1), 1, VoteKind::Prepare);

        set.add_vote(vote(&keys[0], first));
        assert_eq!(set.add_vote(vote(&keys[0], first)), AddVoteResult::Duplicate);
        assert_eq!(
            set.add_vote(vote(&keys[0], second)),
            AddVoteResult::Equivocation { previous: first }
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.count_for(&second), 0);
    }
}
