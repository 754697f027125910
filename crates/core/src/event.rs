//! Events consumed by the node state machine.

use crate::RequestId;
use gambit_messages::SyncRequest;
use gambit_types::{
    Proposal, PublicKey, QuorumCertificate, SessionId, Transaction, ViewChange, Vote,
};

/// Processing priority for events scheduled at the same instant.
///
/// Lower values run first: timers before network input before new client
/// requests, so a timeout is never starved by a burst of traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Timer = 0,
    Network = 1,
    Client = 2,
}

/// Something that happened to the node.
///
/// Events are passive: they describe input, never what to do about it.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// The view timer of a session fired.
    ViewTimeout { session: SessionId },

    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// A peer announced a new game.
    GameStartReceived {
        white: PublicKey,
        black: PublicKey,
    },

    /// A peer gossiped a pooled transaction.
    TransactionGossipReceived { tx: Transaction },

    /// A leader proposed a move.
    ProposalReceived { proposal: Proposal },

    /// A peer voted (we lead the vote's view).
    VoteReceived { vote: Vote },

    /// The leader formed a prepare QC.
    PreparedReceived {
        proposal: Proposal,
        qc: QuorumCertificate,
    },

    /// The leader formed a commit QC, or a peer replayed one for sync.
    CommitReceived {
        proposal: Proposal,
        qc: QuorumCertificate,
    },

    /// A peer timed out and moved views.
    ViewChangeReceived { view_change: ViewChange },

    /// A lagging peer asked for commits.
    SyncRequestReceived { request: SyncRequest },

    // ═══════════════════════════════════════════════════════════════════════
    // Client
    // ═══════════════════════════════════════════════════════════════════════
    /// Start (or look up) the game between two players.
    StartGame {
        white: PublicKey,
        black: PublicKey,
    },

    /// Submit a signed move. Answered by `Action::EmitTransactionResult`.
    SubmitTransaction {
        tx: Transaction,
        request_id: RequestId,
    },
}

impl Event {
    /// Scheduling priority.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::ViewTimeout { .. } => EventPriority::Timer,
            Event::GameStartReceived { .. }
            | Event::TransactionGossipReceived { .. }
            | Event::ProposalReceived { .. }
            | Event::VoteReceived { .. }
            | Event::PreparedReceived { .. }
            | Event::CommitReceived { .. }
            | Event::ViewChangeReceived { .. }
            | Event::SyncRequestReceived { .. } => EventPriority::Network,
            Event::StartGame { .. } | Event::SubmitTransaction { .. } => EventPriority::Client,
        }
    }

    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ViewTimeout { .. } => "ViewTimeout",
            Event::GameStartReceived { .. } => "GameStartReceived",
            Event::TransactionGossipReceived { .. } => "TransactionGossipReceived",
            Event::ProposalReceived { .. } => "ProposalReceived",
            Event::VoteReceived { .. } => "VoteReceived",
            Event::PreparedReceived { .. } => "PreparedReceived",
            Event::CommitReceived { .. } => "CommitReceived",
            Event::ViewChangeReceived { .. } => "ViewChangeReceived",
            Event::SyncRequestReceived { .. } => "SyncRequestReceived",
            Event::StartGame { .. } => "StartGame",
            Event::SubmitTransaction { .. } => "SubmitTransaction",
        }
    }

    /// Session the event concerns.
    pub fn session_id(&self) -> SessionId {
        match self {
            Event::ViewTimeout { session } => *session,
            Event::GameStartReceived { white, black } | Event::StartGame { white, black } => {
                SessionId::for_players(white, black)
            }
            Event::TransactionGossipReceived { tx } | Event::SubmitTransaction { tx, .. } => {
                tx.session_id()
            }
            Event::ProposalReceived { proposal }
            | Event::PreparedReceived { proposal, .. }
            | Event::CommitReceived { proposal, .. } => proposal.session,
            Event::VoteReceived { vote } => vote.session,
            Event::ViewChangeReceived { view_change } => view_change.session,
            Event::SyncRequestReceived { request } => request.session,
        }
    }

    /// Player pair for events that may create their session on first sight.
    ///
    /// Returns None for events that only make sense for a known session
    /// (votes, view changes, sync requests, timers) and for client moves,
    /// which require the game to have been started on this node. The pair is
    /// only returned when it matches [`Event::session_id`].
    pub fn implied_players(&self) -> Option<(&PublicKey, &PublicKey)> {
        let (white, black) = match self {
            Event::GameStartReceived { white, black } | Event::StartGame { white, black } => {
                (white, black)
            }
            Event::TransactionGossipReceived { tx } => (&tx.white_player, &tx.black_player),
            Event::ProposalReceived { proposal }
            | Event::PreparedReceived { proposal, .. }
            | Event::CommitReceived { proposal, .. } => (
                &proposal.transaction.white_player,
                &proposal.transaction.black_player,
            ),
            _ => return None,
        };
        (SessionId::for_players(white, black) == self.session_id()).then_some((white, black))
    }
}
