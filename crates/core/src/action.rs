//! Actions returned by state machines for the runner to perform.

use crate::{OutboundMessage, RequestId};
use gambit_mempool::PoolError;
use gambit_types::{GameState, Hash, PeerId, SessionId, View};
use std::time::Duration;

/// Timer identifiers. Setting a timer with an existing id replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Per-session view timeout.
    ViewTimeout(SessionId),
}

/// Commands for the runner.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Send to every other configured peer (fire-and-forget).
    Broadcast { message: OutboundMessage },

    /// Send to one peer (fire-and-forget).
    SendTo {
        peer: PeerId,
        message: OutboundMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Fire `Event::ViewTimeout` (or the id's event) after `duration`.
    SetTimer { id: TimerId, duration: Duration },

    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Client notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// Answer a `SubmitTransaction`: accepted into the pipeline, or why not.
    EmitTransactionResult {
        request_id: RequestId,
        result: Result<Hash, PoolError>,
    },

    /// A move committed; `state` is the new canonical game state.
    EmitCommittedState {
        session: SessionId,
        view: View,
        state: Box<GameState>,
    },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendTo { .. } => "SendTo",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EmitTransactionResult { .. } => "EmitTransactionResult",
            Action::EmitCommittedState { .. } => "EmitCommittedState",
        }
    }
}
