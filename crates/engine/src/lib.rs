//! Game State Machine.
//!
//! A pure, deterministic function from `(GameState, move)` to either the
//! successor state or a [`MoveError`]. Identical inputs always produce
//! identical outputs on every replica.
//!
//! Supported: all piece movements with unobstructed paths, captures, pawn
//! double steps, check, checkmate and stalemate detection. Castling,
//! en passant and promotion are rejected as [`MoveError::Unsupported`].
//!
//! [`MoveError`]: gambit_types::MoveError
//! [`MoveError::Unsupported`]: gambit_types::MoveError::Unsupported

mod game;
pub mod notation;
mod rules;

pub use game::{apply_move, evaluate_status, legal_moves};
pub use rules::{in_check, is_square_attacked};
