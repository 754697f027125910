//! Transaction gossip message.

use gambit_types::{NetworkMessage, SessionId, Transaction};
use serde::{Deserialize, Serialize};

/// Gossips a pooled transaction so every peer, and therefore every future
/// leader, holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionGossip {
    /// The transaction being gossiped
    pub transaction: Transaction,
}

impl TransactionGossip {
    /// Create a new transaction gossip message.
    pub fn new(transaction: Transaction) -> Self {
        Self { transaction }
    }

    /// Get a reference to the inner transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Consume and return the inner transaction.
    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }

    /// Session the transaction targets.
    pub fn session_id(&self) -> SessionId {
        self.transaction.session_id()
    }
}

// Network message implementation
impl NetworkMessage for TransactionGossip {
    fn message_type_id() -> &'static str {
        "transaction.gossip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_test_helpers::{signed_move, test_players};

    #[test]
    fn test_transaction_gossip_into_transaction() {
        let (white, black) = test_players();
        let tx = signed_move(&white, &black, &white, None, "e2", "e4");

        let hash = tx.hash();
        let gossip = TransactionGossip::new(tx);
        assert_eq!(gossip.transaction().hash(), hash);
        assert_eq!(
            gossip.session_id(),
            SessionId::for_players(&white.public_key(), &black.public_key())
        );
        assert_eq!(gossip.into_transaction().hash(), hash);
    }
}
