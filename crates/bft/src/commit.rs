//! Commit application and catch-up.

use crate::engine::ConsensusEngine;
use crate::error::{ConsensusError, ProtocolError};
use crate::session::{CommittedMove, ConsensusPhase, GameSession};
use gambit_core::{Action, OutboundMessage};
use gambit_mempool::{check_transaction, PoolError};
use gambit_messages::{CommitGossip, SyncRequest};
use gambit_types::{PeerId, Proposal, QuorumCertificate, VoteKind};
use std::time::Duration;
use tracing::{debug, info, trace};

impl ConsensusEngine {
    // ═══════════════════════════════════════════════════════════════════════════
    // QC and Commit Logic
    // ═══════════════════════════════════════════════════════════════════════════

    /// Handle a commit QC from the leader or a sync reply.
    ///
    /// The next height is applied at once, followed by any buffered
    /// successors. Heights beyond it are buffered and trigger a sync request.
    pub(crate) fn on_commit(
        &self,
        session: &mut GameSession,
        proposal: Proposal,
        qc: QuorumCertificate,
        now: Duration,
    ) -> Result<Vec<Action>, ConsensusError> {
        self.check_certified(session, &proposal, &qc, VoteKind::Commit)?;

        let height = proposal.height;
        let committed = session.committed_height();

        if height <= committed {
            if let Some(existing) = session.committed_in(proposal.view) {
                let hash = proposal.hash();
                if existing != hash {
                    return Err(ProtocolError::ConflictingCommit {
                        view: proposal.view,
                        existing,
                        conflicting: hash,
                    }
                    .into());
                }
            }
            trace!(session = ?session.id, height, "Commit already applied");
            return Ok(vec![]);
        }

        if height > committed + 1 {
            let proposer = proposal.proposer;
            debug!(
                session = ?session.id,
                height,
                committed,
                "Buffered commit ahead of committed height"
            );
            session
                .buffered_commits
                .entry(height)
                .or_insert(CommittedMove { proposal, qc });
            return Ok(self.request_sync(session, proposer, now));
        }

        let mut actions = self.apply_commit(session, CommittedMove { proposal, qc })?;

        loop {
            let next_height = session.next_height();
            let Some(next) = session.buffered_commits.remove(&next_height) else {
                break;
            };
            match self.apply_commit(session, next) {
                Ok(more) => actions.extend(more),
                Err(err) => {
                    self.log_dropped(session, "BufferedCommit", &err);
                    break;
                }
            }
        }

        actions.extend(self.after_commit(session, now));
        Ok(actions)
    }

    /// Apply the move at the next height and record its certificate.
    fn apply_commit(
        &self,
        session: &mut GameSession,
        committed: CommittedMove,
    ) -> Result<Vec<Action>, ConsensusError> {
        let hash = committed.proposal.hash();
        let view = committed.proposal.view;

        if let Some(existing) = session.committed_in(view) {
            if existing != hash {
                return Err(ProtocolError::ConflictingCommit {
                    view,
                    existing,
                    conflicting: hash,
                }
                .into());
            }
        }

        let tx = &committed.proposal.transaction;
        let tx_hash = tx.hash();
        if session.pool.is_head_commit(&tx_hash) {
            return Err(PoolError::StaleProposal.into());
        }
        let new_state = check_transaction(tx, &session.state)?;
        let action = tx.action;

        session.committed_views.insert(view, hash);
        let pruned = session.pool.on_commit(tx_hash, &new_state);
        session.state = new_state;
        session.highest_qc = committed.qc.clone();
        session.qcs.insert((view, VoteKind::Commit), committed.qc.clone());
        session.commit_log.push(committed);
        session.phase = ConsensusPhase::Idle;
        session.cleanup_committed_height();

        info!(
            session = ?session.id,
            view = view.0,
            height = session.committed_height(),
            action = %action,
            status = ?session.state.status,
            pruned = pruned.len(),
            "Committed move"
        );

        Ok(vec![Action::EmitCommittedState {
            session: session.id,
            view,
            state: Box::new(session.state.clone()),
        }])
    }

    /// Move past the committed view and pick up the next height.
    fn after_commit(&self, session: &mut GameSession, now: Duration) -> Vec<Action> {
        let target = session.view.max(session.highest_qc.view.next());
        if target > session.view {
            return self.enter_view(session, target, now);
        }
        // Already past the committed view: progress still resets the timer
        session.view_started_at = now;
        self.resume_view(session, now)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════════════════════

    /// Ask `peer` for the commits we are missing.
    ///
    /// Repeats of the same request are suppressed for one view timeout.
    pub(crate) fn request_sync(
        &self,
        session: &mut GameSession,
        peer: PeerId,
        now: Duration,
    ) -> Vec<Action> {
        if peer == self.local_peer_id() {
            return vec![];
        }
        let from_height = session.next_height();
        if let Some((last, at)) = session.last_sync_request {
            if last == from_height && now.saturating_sub(at) < self.config().view_timeout {
                return vec![];
            }
        }
        session.last_sync_request = Some((from_height, now));

        debug!(session = ?session.id, peer = ?peer, from_height, "Requesting missed commits");
        vec![Action::SendTo {
            peer,
            message: OutboundMessage::SyncRequest(SyncRequest::new(
                session.id,
                from_height,
                self.local_peer_id(),
            )),
        }]
    }

    /// Replay committed moves to a lagging peer.
    ///
    /// The request is unsigned; every reply carries its own commit QC.
    pub(crate) fn on_sync_request(
        &self,
        session: &mut GameSession,
        request: SyncRequest,
    ) -> Result<Vec<Action>, ConsensusError> {
        let requester = request.requester;
        if !self.topology().is_peer(&requester) {
            return Err(ProtocolError::UnknownPeer(requester).into());
        }
        if requester == self.local_peer_id() {
            return Ok(vec![]);
        }

        let skip = request.from_height.saturating_sub(1) as usize;
        let actions: Vec<Action> = session
            .commit_log
            .iter()
            .skip(skip)
            .take(self.config().max_sync_batch)
            .map(|committed| Action::SendTo {
                peer: requester,
                message: OutboundMessage::Commit(Box::new(CommitGossip::new(
                    committed.proposal.clone(),
                    committed.qc.clone(),
                ))),
            })
            .collect();

        debug!(
            session = ?session.id,
            requester = ?requester,
            from_height = request.from_height,
            replayed = actions.len(),
            "Replaying commits"
        );
        Ok(actions)
    }
}
