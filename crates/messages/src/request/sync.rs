//! Sync-related request messages.

use gambit_types::{NetworkMessage, PeerId, SessionId};
use serde::{Deserialize, Serialize};

/// Request for the commits of a session starting at a given height.
///
/// Sent by a peer that received a commit it cannot apply yet. The responder
/// replays its stored [`CommitGossip`](crate::CommitGossip) messages to the
/// requester; those carry their own QCs, so the request needs no signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub session: SessionId,

    /// First missing height.
    pub from_height: u64,

    /// Peer requesting the commits
    pub requester: PeerId,
}

impl SyncRequest {
    /// Create a new sync request.
    pub fn new(session: SessionId, from_height: u64, requester: PeerId) -> Self {
        Self {
            session,
            from_height,
            requester,
        }
    }
}

// Network message implementation
impl NetworkMessage for SyncRequest {
    fn message_type_id() -> &'static str {
        "sync.request"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_test_helpers::{test_keypair, test_players};

    #[test]
    fn test_sync_request() {
        let (white, black) = test_players();
        let session = SessionId::for_players(&white.public_key(), &black.public_key());
        let requester = test_keypair(3).peer_id();

        let request = SyncRequest::new(session, 4, requester);
        assert_eq!(request.from_height, 4);
        assert_eq!(request.requester, requester);
        assert_eq!(SyncRequest::message_type_id(), "sync.request");
    }
}
