//! Signed move transactions.

use crate::{signing, Hash, KeyPair, Position, PublicKey, SessionId, Signature};
use serde::{Deserialize, Serialize};

/// A single piece movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveAction {
    pub from: Position,
    pub to: Position,
}

impl MoveAction {
    pub fn new(from: Position, to: Position) -> Self {
        Self { from, to }
    }
}

impl std::fmt::Display for MoveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// A move submitted by a player, signed with their key.
///
/// The signature covers every field except itself and `pub_key`; see
/// [`signing::transaction_message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub white_player: PublicKey,
    pub black_player: PublicKey,

    /// Hash of the state the move was made against. `None` opts out of the
    /// staleness check.
    pub prior_state_hash: Option<Hash>,

    pub action: MoveAction,
    pub signature: Signature,
    pub pub_key: PublicKey,
}

impl Transaction {
    /// Build and sign a transaction.
    pub fn new_signed(
        white_player: PublicKey,
        black_player: PublicKey,
        prior_state_hash: Option<Hash>,
        action: MoveAction,
        signer: &KeyPair,
    ) -> Self {
        let message = signing::transaction_message(
            &white_player,
            &black_player,
            prior_state_hash.as_ref(),
            action.from,
            action.to,
        );
        Self {
            white_player,
            black_player,
            prior_state_hash,
            action,
            signature: signer.sign(&message),
            pub_key: signer.public_key(),
        }
    }

    /// Get the message that was signed.
    pub fn signing_message(&self) -> Vec<u8> {
        signing::transaction_message(
            &self.white_player,
            &self.black_player,
            self.prior_state_hash.as_ref(),
            self.action.from,
            self.action.to,
        )
    }

    /// Whether `signature` verifies against `pub_key`.
    pub fn verify_signature(&self) -> bool {
        self.pub_key
            .verify(&self.signing_message(), &self.signature)
    }

    /// Identity of the transaction: the signed content plus the signer.
    pub fn hash(&self) -> Hash {
        Hash::from_parts(&[&self.signing_message(), self.pub_key.as_bytes()])
    }

    /// Session the transaction targets.
    pub fn session_id(&self) -> SessionId {
        SessionId::for_players(&self.white_player, &self.black_player)
    }
}
