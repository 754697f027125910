//! Movement patterns and attack detection.
//!
//! These functions only look at piece geometry and occupancy. Turn order,
//! own-piece captures and king safety are checked by the caller.

use gambit_types::{Board, Color, MoveError, Piece, PieceKind, Position, SpecialMove};

fn delta(from: Position, to: Position) -> (i8, i8) {
    (
        to.row as i8 - from.row as i8,
        to.col as i8 - from.col as i8,
    )
}

/// Every square strictly between `from` and `to` on a rank, file or diagonal
/// is empty.
fn path_clear(board: &Board, from: Position, to: Position) -> bool {
    let (d_row, d_col) = delta(from, to);
    let step = (d_row.signum(), d_col.signum());
    let mut current = from;
    loop {
        current = match current.offset(step.0, step.1) {
            Some(next) => next,
            None => return false,
        };
        if current == to {
            return true;
        }
        if board.get(current).is_some() {
            return false;
        }
    }
}

fn slides_straight(board: &Board, from: Position, to: Position) -> bool {
    let (d_row, d_col) = delta(from, to);
    (d_row == 0) != (d_col == 0) && path_clear(board, from, to)
}

fn slides_diagonal(board: &Board, from: Position, to: Position) -> bool {
    let (d_row, d_col) = delta(from, to);
    d_row != 0 && d_row.abs() == d_col.abs() && path_clear(board, from, to)
}

fn knight_jump(from: Position, to: Position) -> bool {
    let (d_row, d_col) = delta(from, to);
    matches!((d_row.abs(), d_col.abs()), (1, 2) | (2, 1))
}

fn king_step(from: Position, to: Position) -> bool {
    let (d_row, d_col) = delta(from, to);
    from != to && d_row.abs() <= 1 && d_col.abs() <= 1
}

/// Row a pawn of `color` must stand on to capture en passant.
fn en_passant_row(color: Color) -> u8 {
    match color {
        Color::White => 4,
        Color::Black => 3,
    }
}

fn check_pawn(board: &Board, piece: Piece, from: Position, to: Position) -> Result<(), MoveError> {
    let illegal = MoveError::IllegalMove {
        kind: PieceKind::Pawn,
    };
    let dir = piece.color.pawn_direction();
    let (d_row, d_col) = delta(from, to);
    let target = board.get(to);

    let legal = if d_col == 0 && d_row == dir {
        target.is_none()
    } else if d_col == 0 && d_row == 2 * dir {
        let between = from.offset(dir, 0).ok_or_else(|| illegal.clone())?;
        from.row == piece.color.pawn_row() && board.get(between).is_none() && target.is_none()
    } else if d_col.abs() == 1 && d_row == dir {
        match target {
            Some(captured) => captured.color != piece.color,
            None => {
                let beside = board.get(Position::new(from.row, to.col));
                let passed_pawn = Some(Piece::new(piece.color.opponent(), PieceKind::Pawn));
                if from.row == en_passant_row(piece.color) && beside == passed_pawn {
                    return Err(MoveError::Unsupported(SpecialMove::EnPassant));
                }
                false
            }
        }
    } else {
        false
    };

    if !legal {
        return Err(illegal);
    }
    if to.row == piece.color.promotion_row() {
        return Err(MoveError::Unsupported(SpecialMove::Promotion));
    }
    Ok(())
}

/// Check that `piece` may travel from `from` to `to`.
///
/// Castling, en passant and promotion are recognised by shape and rejected
/// as [`MoveError::Unsupported`].
pub fn check_pattern(
    board: &Board,
    piece: Piece,
    from: Position,
    to: Position,
) -> Result<(), MoveError> {
    let legal = match piece.kind {
        PieceKind::Pawn => return check_pawn(board, piece, from, to),
        PieceKind::Knight => knight_jump(from, to),
        PieceKind::Bishop => slides_diagonal(board, from, to),
        PieceKind::Rook => slides_straight(board, from, to),
        PieceKind::Queen => slides_straight(board, from, to) || slides_diagonal(board, from, to),
        PieceKind::King => {
            let (d_row, d_col) = delta(from, to);
            let home = Position::new(piece.color.home_row(), 4);
            if !king_step(from, to) && from == home && d_row == 0 && d_col.abs() == 2 {
                return Err(MoveError::Unsupported(SpecialMove::Castling));
            }
            king_step(from, to)
        }
    };

    if legal {
        Ok(())
    } else {
        Err(MoveError::IllegalMove { kind: piece.kind })
    }
}

/// Whether the piece on `from` attacks `target`.
fn attacks(board: &Board, piece: Piece, from: Position, target: Position) -> bool {
    match piece.kind {
        PieceKind::Pawn => {
            let (d_row, d_col) = delta(from, target);
            d_row == piece.color.pawn_direction() && d_col.abs() == 1
        }
        PieceKind::Knight => knight_jump(from, target),
        PieceKind::Bishop => slides_diagonal(board, from, target),
        PieceKind::Rook => slides_straight(board, from, target),
        PieceKind::Queen => {
            slides_straight(board, from, target) || slides_diagonal(board, from, target)
        }
        PieceKind::King => king_step(from, target),
    }
}

/// Whether any piece of color `by` attacks `square`.
pub fn is_square_attacked(board: &Board, square: Position, by: Color) -> bool {
    board
        .pieces()
        .filter(|(_, piece)| piece.color == by)
        .any(|(from, piece)| from != square && attacks(board, piece, from, square))
}

/// Whether `color`'s king is currently attacked. A missing king is not in check.
pub fn in_check(board: &Board, color: Color) -> bool {
    board
        .king_position(color)
        .map(|king| is_square_attacked(board, king, color.opponent()))
        .unwrap_or(false)
}
