//! Consensus engine: the driver that transitions [`GameSession`]s.
//!
//! The engine holds only identity and configuration. All protocol state
//! lives in the session passed to each call, so one engine serves every
//! game a node takes part in.

use crate::config::BftConfig;
use crate::error::{ConsensusError, LivenessTimeout, ProtocolError, ValidationError};
use crate::session::{ConsensusPhase, GameSession};
use gambit_core::{Action, Event, OutboundMessage, RequestId, TimerId};
use gambit_messages::{ProposalGossip, TransactionGossip, ViewChangeGossip};
use gambit_types::{
    GameState, KeyPair, PeerId, Proposal, PublicKey, Role, Topology, Transaction, View,
    ViewChange, VoteKind,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// HotStuff-style consensus driver.
///
/// # Flow per view
///
/// 1. The leader proposes its locked transaction, or the oldest pooled one
/// 2. Peers validate and send a prepare vote to the leader
/// 3. The leader forms a prepare QC and broadcasts it; peers lock and send
///    a commit vote
/// 4. The leader forms a commit QC and broadcasts it; every peer applies
///    the move and moves to the next view
///
/// If a view does not commit in time, peers broadcast a signed view change
/// carrying their lock and move on.
pub struct ConsensusEngine {
    /// Signing key for proposals, votes and view changes.
    signing_key: KeyPair,

    /// Network topology (single source of truth for the peer set).
    topology: Arc<dyn Topology>,

    config: BftConfig,
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("peer", &self.local_peer_id())
            .field("peers", &self.topology.num_peers())
            .field("config", &self.config)
            .finish()
    }
}

impl ConsensusEngine {
    /// Create an engine for the local peer.
    pub fn new(signing_key: KeyPair, topology: Arc<dyn Topology>, config: BftConfig) -> Self {
        Self {
            signing_key,
            topology,
            config,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Topology Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get the local peer ID.
    pub(crate) fn local_peer_id(&self) -> PeerId {
        self.topology.local_peer_id()
    }

    pub(crate) fn leader_for(&self, view: View) -> PeerId {
        self.topology.leader_for(view)
    }

    pub(crate) fn is_leader(&self, view: View) -> bool {
        self.topology.is_leader(view)
    }

    /// Votes a QC needs.
    pub(crate) fn quorum(&self) -> usize {
        self.config.effective_quorum(self.topology.num_peers())
    }

    /// Distinct peers that must be ahead before we follow them (f+1).
    pub(crate) fn view_change_threshold(&self) -> usize {
        self.topology.max_faulty() + 1
    }

    /// Get the public key of a configured peer.
    pub(crate) fn public_key(&self, peer: &PeerId) -> Result<PublicKey, ProtocolError> {
        self.topology
            .public_key(peer)
            .ok_or(ProtocolError::UnknownPeer(*peer))
    }

    pub(crate) fn topology(&self) -> &dyn Topology {
        self.topology.as_ref()
    }

    pub(crate) fn signing_key(&self) -> &KeyPair {
        &self.signing_key
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Public API
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    /// The local peer's role in `view`.
    pub fn role(&self, view: View) -> Role {
        self.topology.role_for(view)
    }

    /// Create the session for a pair of players, at the standard opening.
    ///
    /// Returns the actions that start its view timer.
    pub fn new_session(
        &self,
        white: PublicKey,
        black: PublicKey,
        now: Duration,
    ) -> (GameSession, Vec<Action>) {
        let session = GameSession::new(GameState::new(white, black), now);
        info!(
            session = ?session.id,
            leader = ?self.leader_for(session.view),
            "Session created"
        );
        let actions = vec![self.view_timer(&session, self.config.view_timeout)];
        (session, actions)
    }

    /// Whether a message for a session unknown here may create it.
    ///
    /// A gossiped move must carry a valid player signature. A proposal or
    /// certificate must be signed by a configured peer.
    pub fn may_create_session(&self, event: &Event) -> bool {
        match event {
            Event::StartGame { .. } | Event::GameStartReceived { .. } => true,
            Event::TransactionGossipReceived { tx } => tx.verify_signature(),
            Event::ProposalReceived { proposal }
            | Event::PreparedReceived { proposal, .. }
            | Event::CommitReceived { proposal, .. } => self
                .topology
                .public_key(&proposal.proposer)
                .is_some_and(|key| proposal.verify_signature(&key)),
            _ => false,
        }
    }

    /// Process one event for `session`.
    ///
    /// Invalid or adversarial input is logged and dropped; this never fails.
    pub fn handle(&self, session: &mut GameSession, event: Event, now: Duration) -> Vec<Action> {
        if event.session_id() != session.id {
            debug!(
                session = ?session.id,
                event_session = ?event.session_id(),
                event = event.type_name(),
                "Event for another session"
            );
            return vec![];
        }

        let event_type = event.type_name();
        trace!(session = ?session.id, event = event_type, "Handling event");

        let result = match event {
            Event::ViewTimeout { .. } => Ok(self.on_view_timeout(session, now)),
            Event::SubmitTransaction { tx, request_id } => {
                Ok(self.on_submit_transaction(session, tx, request_id, now))
            }
            Event::TransactionGossipReceived { tx } => {
                Ok(self.on_transaction_gossip(session, tx, now))
            }
            Event::ProposalReceived { proposal } => self.on_proposal(session, proposal, now),
            Event::VoteReceived { vote } => self.on_vote(session, vote, now),
            Event::PreparedReceived { proposal, qc } => {
                self.on_prepared(session, proposal, qc, now)
            }
            Event::CommitReceived { proposal, qc } => self.on_commit(session, proposal, qc, now),
            Event::ViewChangeReceived { view_change } => {
                self.on_view_change(session, view_change, now)
            }
            Event::SyncRequestReceived { request } => self.on_sync_request(session, request),
            // Session creation is the registry's concern
            Event::GameStartReceived { .. } | Event::StartGame { .. } => Ok(vec![]),
        };

        match result {
            Ok(actions) => actions,
            Err(err) => {
                self.log_dropped(session, event_type, &err);
                vec![]
            }
        }
    }

    pub(crate) fn log_dropped(
        &self,
        session: &GameSession,
        event_type: &'static str,
        err: &ConsensusError,
    ) {
        match err {
            ConsensusError::Protocol(
                ProtocolError::StaleView { .. } | ProtocolError::StaleHeight { .. },
            ) => debug!(
                session = ?session.id,
                view = session.view.0,
                event = event_type,
                error = %err,
                "Dropped stale message"
            ),
            ConsensusError::Timeout(_) => info!(
                session = ?session.id,
                view = session.view.0,
                error = %err,
                "Liveness timeout"
            ),
            _ => warn!(
                session = ?session.id,
                view = session.view.0,
                event = event_type,
                error = %err,
                "Dropped invalid message"
            ),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Transactions
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_submit_transaction(
        &self,
        session: &mut GameSession,
        tx: Transaction,
        request_id: RequestId,
        now: Duration,
    ) -> Vec<Action> {
        let result = session.pool.submit(tx.clone(), &session.state);
        let mut actions = vec![];

        match &result {
            Ok(tx_hash) => {
                info!(
                    session = ?session.id,
                    tx = ?tx_hash,
                    action = %tx.action,
                    "Transaction accepted"
                );
                actions.push(Action::Broadcast {
                    message: OutboundMessage::TransactionGossip(Box::new(
                        TransactionGossip::new(tx),
                    )),
                });
            }
            Err(err) => {
                debug!(session = ?session.id, error = %err, "Transaction rejected");
            }
        }

        let accepted = result.is_ok();
        actions.push(Action::EmitTransactionResult { request_id, result });
        if accepted {
            actions.extend(self.try_propose(session, now));
        }
        actions
    }

    fn on_transaction_gossip(
        &self,
        session: &mut GameSession,
        tx: Transaction,
        now: Duration,
    ) -> Vec<Action> {
        match session.pool.submit(tx, &session.state) {
            Ok(tx_hash) => {
                debug!(session = ?session.id, tx = ?tx_hash, "Pooled gossiped transaction");
                self.try_propose(session, now)
            }
            Err(err) => {
                trace!(session = ?session.id, error = %err, "Ignored gossiped transaction");
                vec![]
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Proposer Logic
    // ═══════════════════════════════════════════════════════════════════════════

    /// Propose if we lead the current view and have something to propose.
    ///
    /// A transaction locked at the next height takes precedence over the
    /// pool, and is re-proposed with its prepare QC as justification.
    pub(crate) fn try_propose(&self, session: &mut GameSession, now: Duration) -> Vec<Action> {
        let view = session.view;
        if !self.is_leader(view)
            || session.phase != ConsensusPhase::Idle
            || session.proposed_view == Some(view)
            || session.state.status.is_terminal()
        {
            return vec![];
        }

        let height = session.next_height();
        let (transaction, justify) = match &session.locked {
            Some(lock) if lock.proposal.height == height => (
                lock.proposal.transaction.clone(),
                Some(lock.qc.clone()),
            ),
            _ => match session.pool.next_for_proposal() {
                Some(tx) => (tx, None),
                None => return vec![],
            },
        };

        let proposal = Proposal::new_signed(
            view,
            height,
            session.highest_qc.clone(),
            justify,
            transaction,
            &self.signing_key,
        );
        session.proposed_view = Some(view);
        session.phase = ConsensusPhase::Proposing;

        info!(
            session = ?session.id,
            view = view.0,
            height,
            action = %proposal.transaction.action,
            reproposal = proposal.justify.is_some(),
            "Proposing move"
        );

        let mut actions = vec![Action::Broadcast {
            message: OutboundMessage::Proposal(Box::new(ProposalGossip::new(proposal.clone()))),
        }];

        // The leader votes on its own proposal like everyone else
        match self.on_proposal(session, proposal, now) {
            Ok(own) => actions.extend(own),
            Err(err) => self.log_dropped(session, "Proposal", &err),
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // View Change
    // ═══════════════════════════════════════════════════════════════════════════

    fn view_timer(&self, session: &GameSession, duration: Duration) -> Action {
        Action::SetTimer {
            id: TimerId::ViewTimeout(session.id),
            duration,
        }
    }

    /// Handle the view timer.
    ///
    /// The timer is re-armed on every firing. A view only times out if it
    /// ran for the full timeout and the session has work outstanding.
    fn on_view_timeout(&self, session: &mut GameSession, now: Duration) -> Vec<Action> {
        let timeout = self.config.view_timeout;
        let elapsed = now.saturating_sub(session.view_started_at);

        if elapsed < timeout {
            return vec![self.view_timer(session, timeout - elapsed)];
        }

        if !session.has_pending_work() {
            session.view_started_at = now;
            return vec![self.view_timer(session, timeout)];
        }

        let timed_out = session.view;
        let err = ConsensusError::from(LivenessTimeout { view: timed_out });
        self.log_dropped(session, "ViewTimeout", &err);

        session.phase = ConsensusPhase::ViewChanging;
        session.stats.view_changes += 1;

        let new_view = timed_out.next();
        let mut actions = vec![self.view_timer(session, timeout)];
        actions.extend(self.broadcast_view_change(session, new_view));
        actions.extend(self.enter_view(session, new_view, now));
        actions
    }

    /// Broadcast our signal for `new_view`, at most once per view.
    fn broadcast_view_change(&self, session: &mut GameSession, new_view: View) -> Vec<Action> {
        if !session.view_changes.should_broadcast(new_view) || !self.role(new_view).votes() {
            return vec![];
        }
        session.view_changes.mark_broadcast(new_view);
        session.view_changes.record(self.local_peer_id(), new_view);

        let view_change = ViewChange::new_signed(
            session.id,
            new_view,
            session.highest_qc.view,
            session.locked.clone(),
            &self.signing_key,
        );
        debug!(
            session = ?session.id,
            new_view = new_view.0,
            locked = ?session.locked.as_ref().map(|l| l.qc.view),
            "Broadcasting view change"
        );

        vec![Action::Broadcast {
            message: OutboundMessage::ViewChange(Box::new(ViewChangeGossip::new(view_change))),
        }]
    }

    /// Move to a later view.
    ///
    /// Requeues in-flight transactions, processes a proposal buffered for
    /// the new view and proposes if we lead it.
    pub(crate) fn enter_view(
        &self,
        session: &mut GameSession,
        view: View,
        now: Duration,
    ) -> Vec<Action> {
        if view <= session.view {
            return vec![];
        }

        let previous = session.view;
        session.view = view;
        session.view_started_at = now;
        session.phase = ConsensusPhase::Idle;
        let requeued = session.pool.requeue_in_flight();
        session.cleanup_old_views();

        info!(
            session = ?session.id,
            from = previous.0,
            to = view.0,
            requeued,
            leader = ?self.leader_for(view),
            "Entered view"
        );

        self.resume_view(session, now)
    }

    /// Pick up work for the current view: a buffered proposal, then our own.
    pub(crate) fn resume_view(&self, session: &mut GameSession, now: Duration) -> Vec<Action> {
        let mut actions = vec![];
        if let Some(proposal) = session.future_proposals.remove(&session.view) {
            match self.consider_proposal(session, proposal, now) {
                Ok(more) => actions.extend(more),
                Err(err) => self.log_dropped(session, "BufferedProposal", &err),
            }
        }
        actions.extend(self.try_propose(session, now));
        actions
    }

    /// Handle a verified-on-receipt view change signal.
    fn on_view_change(
        &self,
        session: &mut GameSession,
        view_change: ViewChange,
        now: Duration,
    ) -> Result<Vec<Action>, ConsensusError> {
        let sender = view_change.sender;
        let public_key = self.public_key(&sender)?;
        if !view_change.verify_signature(&public_key) {
            return Err(ValidationError::BadSignature(sender).into());
        }
        if sender == self.local_peer_id() {
            return Ok(vec![]);
        }

        let mut actions = vec![];

        if let Some(lock) = view_change.locked {
            if lock.proposal.height == session.next_height()
                && self
                    .check_certified(session, &lock.proposal, &lock.qc, VoteKind::Prepare)
                    .is_ok()
            {
                session
                    .known_proposals
                    .insert(lock.proposal.hash(), lock.proposal.clone());
                let higher =
                    !matches!(&session.locked, Some(ours) if ours.qc.view >= lock.qc.view);
                if higher {
                    debug!(
                        session = ?session.id,
                        from = ?sender,
                        lock_view = lock.qc.view.0,
                        "Adopted higher lock from view change"
                    );
                    session.pool.mark_in_flight(&lock.proposal.transaction, lock.qc.view);
                    session.locked = Some(lock);
                }
            } else {
                debug!(session = ?session.id, from = ?sender, "Ignored lock in view change");
            }
        }

        if view_change.highest_qc_view > session.highest_qc.view {
            actions.extend(self.request_sync(session, sender, now));
        }

        if session.view_changes.record(sender, view_change.new_view) {
            let threshold = self.view_change_threshold();
            if let Some(target) = session.view_changes.supported_view(session.view, threshold) {
                info!(
                    session = ?session.id,
                    view = session.view.0,
                    target = target.0,
                    "Following view change"
                );
                session.stats.view_syncs += 1;
                actions.extend(self.broadcast_view_change(session, target));
                actions.extend(self.enter_view(session, target, now));
                return Ok(actions);
            }
        }

        // A newly adopted lock may be what an idle leader was missing
        actions.extend(self.try_propose(session, now));
        Ok(actions)
    }
}
