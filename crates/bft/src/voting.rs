//! Proposal validation, voting and QC formation.

use crate::engine::ConsensusEngine;
use crate::error::{ConsensusError, ProtocolError, ValidationError};
use crate::session::{ConsensusPhase, EquivocationEvidence, EvidenceKind, GameSession};
use crate::vote_set::{AddVoteResult, VoteSet};
use gambit_core::{Action, OutboundMessage};
use gambit_mempool::{check_transaction, PoolError};
use gambit_messages::{CommitGossip, PreparedGossip, VoteGossip};
use gambit_types::{LockedProposal, Proposal, QuorumCertificate, View, Vote, VoteKind};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

impl ConsensusEngine {
    // ═══════════════════════════════════════════════════════════════════════════
    // Proposal Reception
    // ═══════════════════════════════════════════════════════════════════════════

    /// Handle a proposal, our own included.
    ///
    /// Authenticates it, records it for equivocation detection and either
    /// buffers it (future view) or considers it for a prepare vote.
    pub(crate) fn on_proposal(
        &self,
        session: &mut GameSession,
        proposal: Proposal,
        now: Duration,
    ) -> Result<Vec<Action>, ConsensusError> {
        let proposer = proposal.proposer;
        let view = proposal.view;

        let public_key = self.public_key(&proposer)?;
        if !proposal.verify_signature(&public_key) {
            return Err(ValidationError::BadSignature(proposer).into());
        }
        if proposer != self.leader_for(view) {
            return Err(ProtocolError::WrongLeader { proposer, view }.into());
        }

        let hash = proposal.hash();
        match session.proposals_seen.get(&(view, proposer)) {
            Some(seen) if *seen == hash => {
                trace!(session = ?session.id, view = view.0, "Duplicate proposal");
                return Ok(vec![]);
            }
            Some(seen) => {
                let evidence = EquivocationEvidence {
                    peer: proposer,
                    view,
                    kind: EvidenceKind::Proposal,
                    first: *seen,
                    second: hash,
                };
                warn!(
                    session = ?session.id,
                    peer = ?proposer,
                    view = view.0,
                    "Leader equivocated"
                );
                session.record_evidence(evidence);
                return Err(ProtocolError::Equivocation {
                    peer: proposer,
                    view,
                }
                .into());
            }
            None => {
                session.proposals_seen.insert((view, proposer), hash);
            }
        }

        if proposal.height == session.next_height() {
            session.known_proposals.insert(hash, proposal.clone());
        }

        if view < session.view {
            return Err(ProtocolError::StaleView {
                got: view,
                current: session.view,
            }
            .into());
        }
        if view > session.view {
            if view.0 > session.view.0.saturating_add(self.config().max_future_views) {
                return Err(ProtocolError::FutureView {
                    got: view,
                    current: session.view,
                }
                .into());
            }
            debug!(
                session = ?session.id,
                view = view.0,
                current = session.view.0,
                "Buffered proposal for future view"
            );
            session.future_proposals.insert(view, proposal);
            return Ok(vec![]);
        }

        self.consider_proposal(session, proposal, now)
    }

    /// Decide whether to prepare-vote for a proposal in the current view.
    ///
    /// Vote conditions, in order:
    /// - the parent QC is the commit QC of our committed height, from an
    ///   earlier view
    /// - we have not prepare-voted in this view
    /// - the transaction is valid against the committed state
    /// - we are unlocked, locked on the same transaction, or the proposal
    ///   justifies itself with a later prepare QC for the same transaction
    pub(crate) fn consider_proposal(
        &self,
        session: &mut GameSession,
        proposal: Proposal,
        now: Duration,
    ) -> Result<Vec<Action>, ConsensusError> {
        let view = proposal.view;
        let committed = session.committed_height();

        if proposal.height <= committed {
            return Err(ProtocolError::StaleHeight {
                got: proposal.height,
                committed,
            }
            .into());
        }

        let parent = &proposal.parent_qc;
        if parent.kind != VoteKind::Commit
            || parent.session != session.id
            || parent.height.checked_add(1) != Some(proposal.height)
            || parent.view >= view
        {
            return Err(ProtocolError::BadParentQc.into());
        }

        if proposal.height > committed + 1 {
            // The proposer committed moves we have not seen yet
            parent.verify(self.topology(), self.quorum())?;
            let proposer = proposal.proposer;
            debug!(
                session = ?session.id,
                height = proposal.height,
                committed,
                "Proposal ahead of committed height"
            );
            session.future_proposals.insert(view, proposal);
            return Ok(self.request_sync(session, proposer, now));
        }

        let ours = &session.highest_qc;
        if parent.view != ours.view || parent.proposal_hash != ours.proposal_hash {
            return Err(ProtocolError::BadParentQc.into());
        }
        if parent.signatures != ours.signatures {
            parent.verify(self.topology(), self.quorum())?;
        }

        if session.prepare_votes.contains_key(&view) {
            trace!(session = ?session.id, view = view.0, "Already prepare-voted this view");
            return Ok(vec![]);
        }

        let tx = &proposal.transaction;
        let tx_hash = tx.hash();
        if session.pool.is_head_commit(&tx_hash) {
            return Err(PoolError::StaleProposal.into());
        }
        check_transaction(tx, &session.state)?;

        if let Some(lock) = &session.locked {
            if lock.proposal.transaction.hash() != tx_hash {
                let justified = proposal
                    .justify
                    .as_ref()
                    .and_then(|qc| self.justified_lock(session, qc, lock.qc.view, &proposal));
                match justified {
                    Some(newer) => {
                        debug!(
                            session = ?session.id,
                            old = lock.qc.view.0,
                            new = newer.qc.view.0,
                            "Lock moved by justified proposal"
                        );
                        session.locked = Some(newer);
                    }
                    None => return Err(ProtocolError::LockConflict.into()),
                }
            }
        }

        session.pool.mark_in_flight(&proposal.transaction, view);

        if !self.role(view).votes() {
            return Ok(vec![]);
        }

        let hash = proposal.hash();
        session.prepare_votes.insert(view, hash);
        session.phase = ConsensusPhase::Voting;

        debug!(
            session = ?session.id,
            view = view.0,
            height = proposal.height,
            proposal = ?hash,
            "Prepare vote"
        );

        let vote = Vote::new_signed(
            session.id,
            view,
            proposal.height,
            VoteKind::Prepare,
            hash,
            self.signing_key(),
        );
        Ok(self.send_vote(session, vote, now))
    }

    /// A prepare QC that lets a locked peer vote for a different proposal.
    ///
    /// It must be later than our lock, earlier than the proposal, and certify
    /// a proposal we know that carries the same transaction.
    fn justified_lock(
        &self,
        session: &GameSession,
        qc: &QuorumCertificate,
        locked_view: View,
        proposal: &Proposal,
    ) -> Option<LockedProposal> {
        if qc.kind != VoteKind::Prepare
            || qc.height != proposal.height
            || qc.view <= locked_view
            || qc.view >= proposal.view
        {
            return None;
        }
        let justified = session.known_proposals.get(&qc.proposal_hash)?;
        if justified.transaction.hash() != proposal.transaction.hash() {
            return None;
        }
        self.check_certified(session, justified, qc, VoteKind::Prepare)
            .ok()?;
        Some(LockedProposal {
            proposal: justified.clone(),
            qc: qc.clone(),
        })
    }

    /// Deliver a vote to the leader of its view, which may be us.
    fn send_vote(&self, session: &mut GameSession, vote: Vote, now: Duration) -> Vec<Action> {
        let leader = self.leader_for(vote.view);
        if leader != self.local_peer_id() {
            return vec![Action::SendTo {
                peer: leader,
                message: OutboundMessage::Vote(VoteGossip::new(vote)),
            }];
        }
        match self.on_vote(session, vote, now) {
            Ok(actions) => actions,
            Err(err) => {
                self.log_dropped(session, "OwnVote", &err);
                vec![]
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Vote Collection
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collect a vote as leader; broadcast a certificate when quorum forms.
    pub(crate) fn on_vote(
        &self,
        session: &mut GameSession,
        vote: Vote,
        now: Duration,
    ) -> Result<Vec<Action>, ConsensusError> {
        let view = vote.view;
        if !self.is_leader(view) {
            return Err(ProtocolError::NotLeader { view }.into());
        }
        if view < session.view {
            return Err(ProtocolError::StaleView {
                got: view,
                current: session.view,
            }
            .into());
        }
        if view > session.view {
            return Err(ProtocolError::FutureView {
                got: view,
                current: session.view,
            }
            .into());
        }
        if vote.height != session.next_height() {
            return Err(ProtocolError::StaleHeight {
                got: vote.height,
                committed: session.committed_height(),
            }
            .into());
        }

        let voter = vote.voter;
        let public_key = self.public_key(&voter)?;
        if !vote.verify_signature(&public_key) {
            return Err(ValidationError::BadSignature(voter).into());
        }

        let kind = vote.kind;
        let hash = vote.proposal_hash;
        let height = vote.height;
        let threshold = self.quorum();
        let session_id = session.id;

        let set = session
            .vote_sets
            .entry((view, kind))
            .or_insert_with(|| VoteSet::new(session_id, view, height, kind));
        match set.add_vote(vote) {
            AddVoteResult::Duplicate => return Ok(vec![]),
            AddVoteResult::Equivocation { previous } => {
                warn!(
                    session = ?session.id,
                    peer = ?voter,
                    view = view.0,
                    kind = ?kind,
                    "Voter equivocated"
                );
                session.record_evidence(EquivocationEvidence {
                    peer: voter,
                    view,
                    kind: EvidenceKind::Vote(kind),
                    first: previous,
                    second: hash,
                });
                return Err(ProtocolError::Equivocation { peer: voter, view }.into());
            }
            AddVoteResult::Added { count } => {
                debug!(
                    session = ?session.id,
                    view = view.0,
                    kind = ?kind,
                    voter = ?voter,
                    count,
                    threshold,
                    "Vote added"
                );
            }
        }

        let Some(proposal) = session.known_proposals.get(&hash).cloned() else {
            debug!(session = ?session.id, proposal = ?hash, "Vote for unknown proposal");
            return Ok(vec![]);
        };
        let Some(qc) = session
            .vote_sets
            .get_mut(&(view, kind))
            .and_then(|set| set.try_build_qc(hash, threshold))
        else {
            return Ok(vec![]);
        };

        info!(
            session = ?session.id,
            view = view.0,
            height,
            kind = ?kind,
            signers = qc.signer_count(),
            "Quorum certificate formed"
        );
        session.qcs.insert((view, kind), qc.clone());

        let mut actions = match kind {
            VoteKind::Prepare => vec![Action::Broadcast {
                message: OutboundMessage::Prepared(Box::new(PreparedGossip::new(
                    proposal.clone(),
                    qc.clone(),
                ))),
            }],
            VoteKind::Commit => vec![Action::Broadcast {
                message: OutboundMessage::Commit(Box::new(CommitGossip::new(
                    proposal.clone(),
                    qc.clone(),
                ))),
            }],
        };
        let own = match kind {
            VoteKind::Prepare => self.on_prepared(session, proposal, qc, now)?,
            VoteKind::Commit => self.on_commit(session, proposal, qc, now)?,
        };
        actions.extend(own);
        Ok(actions)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Prepare QC
    // ═══════════════════════════════════════════════════════════════════════════

    /// Handle a prepare QC: lock on it and send a commit vote.
    pub(crate) fn on_prepared(
        &self,
        session: &mut GameSession,
        proposal: Proposal,
        qc: QuorumCertificate,
        now: Duration,
    ) -> Result<Vec<Action>, ConsensusError> {
        self.check_certified(session, &proposal, &qc, VoteKind::Prepare)?;

        let committed = session.committed_height();
        if proposal.height <= committed {
            return Err(ProtocolError::StaleHeight {
                got: proposal.height,
                committed,
            }
            .into());
        }
        if proposal.height > committed + 1 {
            return Ok(self.request_sync(session, proposal.proposer, now));
        }

        let view = proposal.view;
        let hash = qc.proposal_hash;
        session.known_proposals.insert(hash, proposal.clone());
        session.qcs.insert((view, VoteKind::Prepare), qc.clone());
        session.pool.mark_in_flight(&proposal.transaction, view);

        let higher = !matches!(&session.locked, Some(lock) if lock.qc.view >= qc.view);
        if higher {
            debug!(session = ?session.id, view = view.0, proposal = ?hash, "Locked");
            session.locked = Some(LockedProposal {
                proposal: proposal.clone(),
                qc,
            });
        }

        if view != session.view {
            debug!(
                session = ?session.id,
                view = view.0,
                current = session.view.0,
                "Prepare QC outside current view, not voting"
            );
            return Ok(vec![]);
        }
        let locked_here = session
            .locked
            .as_ref()
            .is_some_and(|lock| lock.qc.proposal_hash == hash);
        if !locked_here || session.commit_votes.contains_key(&view) || !self.role(view).votes() {
            return Ok(vec![]);
        }

        session.commit_votes.insert(view, hash);
        session.phase = ConsensusPhase::Committing;
        debug!(session = ?session.id, view = view.0, proposal = ?hash, "Commit vote");

        let vote = Vote::new_signed(
            session.id,
            view,
            proposal.height,
            VoteKind::Commit,
            hash,
            self.signing_key(),
        );
        Ok(self.send_vote(session, vote, now))
    }

    /// Check that `qc` is a valid `kind` certificate for `proposal`, and
    /// that the proposal itself came from its view's leader.
    pub(crate) fn check_certified(
        &self,
        session: &GameSession,
        proposal: &Proposal,
        qc: &QuorumCertificate,
        kind: VoteKind,
    ) -> Result<(), ConsensusError> {
        if proposal.session != session.id {
            return Err(ValidationError::WrongSession {
                expected: session.id,
                found: proposal.session,
            }
            .into());
        }
        if qc.kind != kind
            || qc.session != proposal.session
            || qc.view != proposal.view
            || qc.height != proposal.height
            || qc.proposal_hash != proposal.hash()
        {
            return Err(ValidationError::MismatchedCertificate.into());
        }
        if proposal.proposer != self.leader_for(proposal.view) {
            return Err(ProtocolError::WrongLeader {
                proposer: proposal.proposer,
                view: proposal.view,
            }
            .into());
        }
        let public_key = self.public_key(&proposal.proposer)?;
        if !proposal.verify_signature(&public_key) {
            return Err(ValidationError::BadSignature(proposal.proposer).into());
        }
        qc.verify(self.topology(), self.quorum())?;
        Ok(())
    }
}
