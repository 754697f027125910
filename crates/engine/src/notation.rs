//! Long algebraic move notation for the game history.

use gambit_types::{GameStatus, Piece, Position};

/// Describe a move, e.g. `e2-e4`, `Ng1-f3`, `Bc4xf7+`, `Qd8-h4#`.
pub fn describe(
    piece: Piece,
    from: Position,
    to: Position,
    capture: bool,
    status: GameStatus,
) -> String {
    let mut out = String::with_capacity(8);
    if let Some(letter) = piece.kind.letter() {
        out.push(letter);
    }
    out.push_str(&from.to_string());
    out.push(if capture { 'x' } else { '-' });
    out.push_str(&to.to_string());
    match status {
        GameStatus::Check => out.push('+'),
        GameStatus::Checkmate { .. } => out.push('#'),
        GameStatus::Ongoing | GameStatus::Stalemate => {}
    }
    out
}
