//! Pool state and admission checks.

use gambit_engine::apply_move;
use gambit_types::{GameState, Hash, MoveError, SessionId, Transaction, View};
use indexmap::IndexMap;
use tracing::debug;

/// Reasons a transaction is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("signature does not verify")]
    BadSignature,

    /// The named player pair has no started session here.
    #[error("no such game")]
    NoSuchGame,

    /// Already committed, or built on a state that is no longer current.
    #[error("stale proposal: resubmit against the latest state")]
    StaleProposal,

    /// Signed by a key other than the player to move.
    #[error("transaction not signed by the player to move")]
    WrongPlayer,

    #[error("illegal move: {0}")]
    IllegalMove(MoveError),

    #[error("transaction already pending")]
    Duplicate,
}

/// Lifecycle of a pooled transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Waiting for a leader to propose it.
    Pending,
    /// Part of a proposal in `view` that has not committed yet.
    InFlight { view: View },
}

#[derive(Debug, Clone)]
struct PoolEntry {
    tx: Transaction,
    status: EntryStatus,
}

/// Check that the signer may make this move on `state`.
fn check_move(tx: &Transaction, state: &GameState) -> Result<GameState, PoolError> {
    let mover = state.turn;
    if tx.pub_key != *state.player_for(mover) {
        return Err(PoolError::WrongPlayer);
    }
    apply_move(state, tx.action.from, tx.action.to, mover).map_err(PoolError::IllegalMove)
}

/// Full validity of a transaction against a committed state, returning the
/// successor state.
///
/// Does not know which transaction produced `state`; callers holding a pool
/// should also consult [`TransactionPool::is_head_commit`].
pub fn check_transaction(tx: &Transaction, state: &GameState) -> Result<GameState, PoolError> {
    if tx.session_id() != state.session_id() {
        return Err(PoolError::NoSuchGame);
    }
    if !tx.verify_signature() {
        return Err(PoolError::BadSignature);
    }
    if tx.prior_state_hash.is_some_and(|prior| prior != state.hash()) {
        return Err(PoolError::StaleProposal);
    }
    check_move(tx, state)
}

/// Per-session buffer of uncommitted transactions, oldest first.
#[derive(Debug)]
pub struct TransactionPool {
    session: SessionId,

    /// Hash of the last committed state.
    head: Hash,

    entries: IndexMap<Hash, PoolEntry>,

    /// Transaction whose commit produced `head`.
    ///
    /// Only this one is remembered: without a prior state hash the same
    /// signed move is legitimately playable again once the position repeats.
    head_commit: Option<Hash>,
}

impl TransactionPool {
    /// Create an empty pool positioned at `state`.
    pub fn new(state: &GameState) -> Self {
        Self {
            session: state.session_id(),
            head: state.hash(),
            entries: IndexMap::new(),
            head_commit: None,
        }
    }

    /// Hash of the state new transactions must build on.
    pub fn head(&self) -> Hash {
        self.head
    }

    /// Admit a transaction against the current committed `state`.
    ///
    /// Returns the transaction hash on success.
    pub fn submit(&mut self, tx: Transaction, state: &GameState) -> Result<Hash, PoolError> {
        if tx.session_id() != self.session {
            return Err(PoolError::NoSuchGame);
        }
        if !tx.verify_signature() {
            return Err(PoolError::BadSignature);
        }

        let hash = tx.hash();
        if self.is_head_commit(&hash) {
            return Err(PoolError::StaleProposal);
        }
        if tx.prior_state_hash.is_some_and(|prior| prior != self.head) {
            return Err(PoolError::StaleProposal);
        }
        if self.entries.contains_key(&hash) {
            return Err(PoolError::Duplicate);
        }
        check_move(&tx, state)?;

        self.entries.insert(
            hash,
            PoolEntry {
                tx,
                status: EntryStatus::Pending,
            },
        );
        Ok(hash)
    }

    /// Oldest pending transaction.
    pub fn next_for_proposal(&self) -> Option<Transaction> {
        self.entries
            .values()
            .find(|entry| entry.status == EntryStatus::Pending)
            .map(|entry| entry.tx.clone())
    }

    /// Record that `tx` is part of a proposal in `view`.
    ///
    /// Inserts the transaction if this peer had not seen it, so it survives a
    /// leader failure. The transaction committed at the head is ignored.
    pub fn mark_in_flight(&mut self, tx: &Transaction, view: View) {
        let hash = tx.hash();
        if self.is_head_commit(&hash) {
            return;
        }
        self.entries
            .entry(hash)
            .and_modify(|entry| entry.status = EntryStatus::InFlight { view })
            .or_insert_with(|| PoolEntry {
                tx: tx.clone(),
                status: EntryStatus::InFlight { view },
            });
    }

    /// Return every in-flight transaction to pending after a view change.
    pub fn requeue_in_flight(&mut self) -> usize {
        let mut requeued = 0;
        for entry in self.entries.values_mut() {
            if matches!(entry.status, EntryStatus::InFlight { .. }) {
                entry.status = EntryStatus::Pending;
                requeued += 1;
            }
        }
        requeued
    }

    /// Apply a commit: drop the committed transaction and any entry that is
    /// no longer valid against the new state.
    ///
    /// Returns the hashes of pruned entries (not including the committed one).
    pub fn on_commit(&mut self, tx_hash: Hash, new_state: &GameState) -> Vec<Hash> {
        self.entries.shift_remove(&tx_hash);
        self.head_commit = Some(tx_hash);
        self.head = new_state.hash();

        let head = self.head;
        let mut pruned = Vec::new();
        self.entries.retain(|hash, entry| {
            let stale = entry.tx.prior_state_hash.is_some_and(|prior| prior != head);
            let valid = !stale && check_move(&entry.tx, new_state).is_ok();
            if !valid {
                pruned.push(*hash);
            }
            valid
        });

        if !pruned.is_empty() {
            debug!(
                session = ?self.session,
                pruned = pruned.len(),
                remaining = self.entries.len(),
                "Pruned transactions invalidated by commit"
            );
        }
        pruned
    }

    /// Whether `tx_hash` is the move that produced the current head.
    pub fn is_head_commit(&self, tx_hash: &Hash) -> bool {
        self.head_commit == Some(*tx_hash)
    }

    /// Whether the transaction is in the pool.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.entries.contains_key(tx_hash)
    }

    /// Status of a pooled transaction.
    pub fn status(&self, tx_hash: &Hash) -> Option<EntryStatus> {
        self.entries.get(tx_hash).map(|entry| entry.status)
    }

    /// Whether any transaction waits for a proposal.
    pub fn has_pending(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.status == EntryStatus::Pending)
    }

    /// Number of pooled transactions (pending and in flight).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
