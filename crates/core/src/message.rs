//! Outbound message types for network communication.

use crate::Event;
use gambit_messages::{
    CommitGossip, GameStartGossip, PreparedGossip, ProposalGossip, SyncRequest,
    TransactionGossip, ViewChangeGossip, VoteGossip,
};
use gambit_types::{NetworkMessage, SessionId};

/// Outbound network messages.
///
/// These are the messages that a node can send to other nodes.
/// The runner handles the actual network I/O.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    // ═══════════════════════════════════════════════════════════════════════
    // Session Messages
    // ═══════════════════════════════════════════════════════════════════════
    /// New game announcement.
    GameStart(GameStartGossip),

    // ═══════════════════════════════════════════════════════════════════════
    // Mempool Messages
    // ═══════════════════════════════════════════════════════════════════════
    /// Transaction gossip.
    TransactionGossip(Box<TransactionGossip>),

    // ═══════════════════════════════════════════════════════════════════════
    // BFT Messages
    // ═══════════════════════════════════════════════════════════════════════
    /// Leader proposal.
    Proposal(Box<ProposalGossip>),

    /// Prepare or commit vote, unicast to the leader.
    Vote(VoteGossip),

    /// Proposal with its prepare QC.
    Prepared(Box<PreparedGossip>),

    /// Proposal with its commit QC.
    Commit(Box<CommitGossip>),

    /// Timeout signal.
    ViewChange(Box<ViewChangeGossip>),

    // ═══════════════════════════════════════════════════════════════════════
    // Sync Messages
    // ═══════════════════════════════════════════════════════════════════════
    /// Request for missed commits.
    SyncRequest(SyncRequest),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::GameStart(_) => "GameStart",
            OutboundMessage::TransactionGossip(_) => "TransactionGossip",
            OutboundMessage::Proposal(_) => "Proposal",
            OutboundMessage::Vote(_) => "Vote",
            OutboundMessage::Prepared(_) => "Prepared",
            OutboundMessage::Commit(_) => "Commit",
            OutboundMessage::ViewChange(_) => "ViewChange",
            OutboundMessage::SyncRequest(_) => "SyncRequest",
        }
    }

    /// Wire topic for this message.
    pub fn topic(&self) -> &'static str {
        match self {
            OutboundMessage::GameStart(_) => GameStartGossip::message_type_id(),
            OutboundMessage::TransactionGossip(_) => TransactionGossip::message_type_id(),
            OutboundMessage::Proposal(_) => ProposalGossip::message_type_id(),
            OutboundMessage::Vote(_) => VoteGossip::message_type_id(),
            OutboundMessage::Prepared(_) => PreparedGossip::message_type_id(),
            OutboundMessage::Commit(_) => CommitGossip::message_type_id(),
            OutboundMessage::ViewChange(_) => ViewChangeGossip::message_type_id(),
            OutboundMessage::SyncRequest(_) => SyncRequest::message_type_id(),
        }
    }

    /// Check if this is a BFT consensus message.
    pub fn is_bft(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Proposal(_)
                | OutboundMessage::Vote(_)
                | OutboundMessage::Prepared(_)
                | OutboundMessage::Commit(_)
                | OutboundMessage::ViewChange(_)
        )
    }

    /// Session the message concerns.
    pub fn session_id(&self) -> SessionId {
        match self {
            OutboundMessage::GameStart(m) => m.session_id(),
            OutboundMessage::TransactionGossip(m) => m.session_id(),
            OutboundMessage::Proposal(m) => m.proposal.session,
            OutboundMessage::Vote(m) => m.vote.session,
            OutboundMessage::Prepared(m) => m.session_id(),
            OutboundMessage::Commit(m) => m.session_id(),
            OutboundMessage::ViewChange(m) => m.view_change.session,
            OutboundMessage::SyncRequest(m) => m.session,
        }
    }

    /// Convert a delivered message into the event its receiver handles.
    pub fn into_event(self) -> Event {
        match self {
            OutboundMessage::GameStart(m) => Event::GameStartReceived {
                white: m.white_player,
                black: m.black_player,
            },
            OutboundMessage::TransactionGossip(m) => Event::TransactionGossipReceived {
                tx: m.into_transaction(),
            },
            OutboundMessage::Proposal(m) => Event::ProposalReceived {
                proposal: m.into_proposal(),
            },
            OutboundMessage::Vote(m) => Event::VoteReceived {
                vote: m.into_vote(),
            },
            OutboundMessage::Prepared(m) => Event::PreparedReceived {
                proposal: m.proposal,
                qc: m.qc,
            },
            OutboundMessage::Commit(m) => Event::CommitReceived {
                proposal: m.proposal,
                qc: m.qc,
            },
            OutboundMessage::ViewChange(m) => Event::ViewChangeReceived {
                view_change: m.into_view_change(),
            },
            OutboundMessage::SyncRequest(request) => Event::SyncRequestReceived { request },
        }
    }
}
