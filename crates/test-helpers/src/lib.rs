//! Deterministic, properly-signed fixtures for tests.
//!
//! Keys are derived from fixed seeds, so every test run (and every peer in a
//! simulation) sees the same identities.

use gambit_types::{
    GameState, Hash, KeyPair, MoveAction, Position, StaticTopology, Topology, Transaction,
};
use std::sync::Arc;

/// Seed offset for player keys, kept apart from peer seeds.
const PLAYER_SEED_BASE: u8 = 200;

/// Deterministic keypair for a seed byte.
pub fn test_keypair(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

/// Keys for `n` consensus peers, seeds `0..n`.
pub fn test_peers(n: usize) -> Vec<KeyPair> {
    (0..n as u8).map(test_keypair).collect()
}

/// White and black player keys, distinct from every peer key.
pub fn test_players() -> (KeyPair, KeyPair) {
    (
        test_keypair(PLAYER_SEED_BASE),
        test_keypair(PLAYER_SEED_BASE + 1),
    )
}

/// Topology over `peers` as seen from `peers[local]`.
pub fn test_topology(peers: &[KeyPair], local: usize) -> Arc<dyn Topology> {
    StaticTopology::new(
        peers[local].peer_id(),
        peers.iter().map(|k| k.public_key()).collect(),
    )
    .expect("test peers are distinct and non-empty")
    .into_arc()
}

/// Fresh game between two players.
pub fn new_game(white: &KeyPair, black: &KeyPair) -> GameState {
    GameState::new(white.public_key(), black.public_key())
}

/// Parse `e2`-style notation, panicking on bad input.
pub fn square(notation: &str) -> Position {
    Position::from_notation(notation).unwrap_or_else(|| panic!("bad square {notation}"))
}

/// A move transaction in the `white` vs `black` game, signed by `signer`.
pub fn signed_move(
    white: &KeyPair,
    black: &KeyPair,
    signer: &KeyPair,
    prior_state_hash: Option<Hash>,
    from: &str,
    to: &str,
) -> Transaction {
    Transaction::new_signed(
        white.public_key(),
        black.public_key(),
        prior_state_hash,
        MoveAction::new(square(from), square(to)),
        signer,
    )
}
