//! Per-game consensus state.
//!
//! A [`GameSession`] owns everything one game's consensus instance mutates:
//! the committed [`GameState`], the view, the transaction pool and the QC
//! history. Only [`ConsensusEngine`](crate::ConsensusEngine) transitions it.

use crate::view_change::ViewChangeTracker;
use crate::vote_set::VoteSet;
use gambit_mempool::TransactionPool;
use gambit_types::{
    GameState, Hash, LockedProposal, PeerId, Proposal, QuorumCertificate, SessionId, View,
    VoteKind,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// Where the session is within its current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsensusPhase {
    /// Waiting for a proposal (or for work, as leader).
    Idle,
    /// We are the leader and broadcast a proposal this view.
    Proposing,
    /// Prepare vote sent, waiting for the prepare QC.
    Voting,
    /// Commit vote sent, waiting for the commit QC.
    Committing,
    /// The view timed out and we are moving to the next one.
    ViewChanging,
}

/// What a peer signed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceKind {
    Proposal,
    Vote(VoteKind),
}

/// Proof that a peer signed two conflicting messages for one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivocationEvidence {
    pub peer: PeerId,
    pub view: View,
    pub kind: EvidenceKind,
    pub first: Hash,
    pub second: Hash,
}

/// A committed move with the certificate that committed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMove {
    pub proposal: Proposal,
    pub qc: QuorumCertificate,
}

/// Session statistics for monitoring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Current view.
    pub view: u64,
    /// Number of committed moves.
    pub committed_height: u64,
    /// Views abandoned because of a local timeout.
    pub view_changes: u64,
    /// Views skipped by following other peers' view changes.
    pub view_syncs: u64,
    /// Peers caught equivocating.
    pub flagged_peers: usize,
}

/// Consensus instance for one pair of players.
pub struct GameSession {
    // ═══════════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════════
    pub(crate) id: SessionId,

    // ═══════════════════════════════════════════════════════════════════════════
    // Committed State
    // ═══════════════════════════════════════════════════════════════════════════
    /// Last committed game state.
    pub(crate) state: GameState,

    /// Commit QC of the last committed move (genesis before the first).
    pub(crate) highest_qc: QuorumCertificate,

    /// Committed (view, proposal hash) pairs. Never rewritten.
    pub(crate) committed_views: BTreeMap<View, Hash>,

    /// Every committed move in order; replayed to lagging peers.
    pub(crate) commit_log: Vec<CommittedMove>,

    // ═══════════════════════════════════════════════════════════════════════════
    // View State
    // ═══════════════════════════════════════════════════════════════════════════
    pub(crate) view: View,
    pub(crate) phase: ConsensusPhase,

    /// When the current view began.
    pub(crate) view_started_at: Duration,

    /// View we last proposed in, as leader.
    pub(crate) proposed_view: Option<View>,

    /// Our prepare votes: view -> proposal hash.
    pub(crate) prepare_votes: BTreeMap<View, Hash>,

    /// Our commit votes: view -> proposal hash.
    pub(crate) commit_votes: BTreeMap<View, Hash>,

    /// Prepare QC we will only abandon for a later one.
    pub(crate) locked: Option<LockedProposal>,

    // ═══════════════════════════════════════════════════════════════════════════
    // Pending State
    // ═══════════════════════════════════════════════════════════════════════════
    pub(crate) pool: TransactionPool,

    /// Proposals seen for the next height, by hash.
    pub(crate) known_proposals: HashMap<Hash, Proposal>,

    /// First proposal hash seen per (view, proposer).
    pub(crate) proposals_seen: HashMap<(View, PeerId), Hash>,

    /// Proposals for views we have not reached yet.
    pub(crate) future_proposals: BTreeMap<View, Proposal>,

    /// Commits we cannot apply until earlier heights arrive: height -> move.
    pub(crate) buffered_commits: BTreeMap<u64, CommittedMove>,

    /// Leader-side vote collection.
    pub(crate) vote_sets: HashMap<(View, VoteKind), VoteSet>,

    /// QCs formed or received, by view and kind.
    pub(crate) qcs: BTreeMap<(View, VoteKind), QuorumCertificate>,

    /// Last sync request: (from height, time sent).
    pub(crate) last_sync_request: Option<(u64, Duration)>,

    pub(crate) view_changes: ViewChangeTracker,

    // ═══════════════════════════════════════════════════════════════════════════
    // Diagnostics
    // ═══════════════════════════════════════════════════════════════════════════
    pub(crate) evidence: Vec<EquivocationEvidence>,
    pub(crate) flagged: BTreeSet<PeerId>,
    pub(crate) stats: SessionStats,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("view", &self.view)
            .field("phase", &self.phase)
            .field("committed_height", &self.committed_height())
            .field("pool", &self.pool.len())
            .field("locked", &self.locked.as_ref().map(|l| l.qc.view))
            .finish()
    }
}

impl GameSession {
    pub(crate) fn new(state: GameState, now: Duration) -> Self {
        let id = state.session_id();
        let pool = TransactionPool::new(&state);
        Self {
            id,
            highest_qc: QuorumCertificate::genesis(id),
            state,
            committed_views: BTreeMap::new(),
            commit_log: Vec::new(),
            view: View(1),
            phase: ConsensusPhase::Idle,
            view_started_at: now,
            proposed_view: None,
            prepare_votes: BTreeMap::new(),
            commit_votes: BTreeMap::new(),
            locked: None,
            pool,
            known_proposals: HashMap::new(),
            proposals_seen: HashMap::new(),
            future_proposals: BTreeMap::new(),
            buffered_commits: BTreeMap::new(),
            vote_sets: HashMap::new(),
            qcs: BTreeMap::new(),
            last_sync_request: None,
            view_changes: ViewChangeTracker::new(),
            evidence: Vec::new(),
            flagged: BTreeSet::new(),
            stats: SessionStats {
                view: 1,
                ..SessionStats::default()
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Last committed game state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn phase(&self) -> ConsensusPhase {
        self.phase
    }

    /// Number of committed moves.
    pub fn committed_height(&self) -> u64 {
        self.state.move_count()
    }

    /// Commit QC of the last committed move.
    pub fn highest_qc(&self) -> &QuorumCertificate {
        &self.highest_qc
    }

    pub fn locked(&self) -> Option<&LockedProposal> {
        self.locked.as_ref()
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Proposal hash committed in `view`, if any.
    pub fn committed_in(&self, view: View) -> Option<Hash> {
        self.committed_views.get(&view).copied()
    }

    /// All committed (view, proposal hash) pairs in view order.
    pub fn committed_views(&self) -> impl Iterator<Item = (View, Hash)> + '_ {
        self.committed_views.iter().map(|(v, h)| (*v, *h))
    }

    /// Committed moves in height order.
    pub fn commit_log(&self) -> &[CommittedMove] {
        &self.commit_log
    }

    /// Cached QC of a given view and kind.
    pub fn qc(&self, view: View, kind: VoteKind) -> Option<&QuorumCertificate> {
        self.qcs.get(&(view, kind))
    }

    /// Recorded equivocation evidence.
    pub fn evidence(&self) -> &[EquivocationEvidence] {
        &self.evidence
    }

    /// Whether `peer` was caught equivocating.
    pub fn is_flagged(&self, peer: &PeerId) -> bool {
        self.flagged.contains(peer)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            view: self.view.0,
            committed_height: self.committed_height(),
            flagged_peers: self.flagged.len(),
            ..self.stats
        }
    }

    /// Whether the session has anything that should make the view time out.
    pub fn has_pending_work(&self) -> bool {
        !self.pool.is_empty() || self.phase != ConsensusPhase::Idle || self.locked.is_some()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internal helpers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Height the next proposal must carry.
    pub(crate) fn next_height(&self) -> u64 {
        self.committed_height() + 1
    }

    pub(crate) fn record_evidence(&mut self, evidence: EquivocationEvidence) {
        self.flagged.insert(evidence.peer);
        if !self.evidence.contains(&evidence) {
            self.evidence.push(evidence);
        }
    }

    /// Drop per-view bookkeeping older than the current view.
    pub(crate) fn cleanup_old_views(&mut self) {
        let view = self.view;
        self.prepare_votes.retain(|v, _| *v >= view);
        self.commit_votes.retain(|v, _| *v >= view);
        self.vote_sets.retain(|(v, _), _| *v >= view);
        self.proposals_seen.retain(|(v, _), _| *v >= view);
        self.future_proposals.retain(|v, _| *v >= view);
    }

    /// Drop state tied to a height that just committed.
    pub(crate) fn cleanup_committed_height(&mut self) {
        let next = self.next_height();
        self.known_proposals.retain(|_, p| p.height >= next);
        self.future_proposals.retain(|_, p| p.height >= next);
        self.buffered_commits.retain(|height, _| *height >= next);
        if self.locked.as_ref().is_some_and(|l| l.proposal.height < next) {
            self.locked = None;
        }
    }
}
