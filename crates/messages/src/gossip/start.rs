//! Game start announcement.

use gambit_types::{NetworkMessage, PublicKey, SessionId};
use serde::{Deserialize, Serialize};

/// Announces a new game so every peer creates the session.
///
/// Unsigned: starting a game only creates the standard starting position,
/// which any peer would create on its own for that player pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStartGossip {
    pub white_player: PublicKey,
    pub black_player: PublicKey,
}

impl GameStartGossip {
    /// Create a new game start announcement.
    pub fn new(white_player: PublicKey, black_player: PublicKey) -> Self {
        Self {
            white_player,
            black_player,
        }
    }

    /// Session being started.
    pub fn session_id(&self) -> SessionId {
        SessionId::for_players(&self.white_player, &self.black_player)
    }
}

impl NetworkMessage for GameStartGossip {
    fn message_type_id() -> &'static str {
        "game.start"
    }
}
