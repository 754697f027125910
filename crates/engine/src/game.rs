//! Move application and game status.

use crate::notation;
use crate::rules::{check_pattern, in_check};
use gambit_types::{Board, Color, GameState, GameStatus, MoveAction, MoveError, Position};

/// Apply a move for `mover`, returning the successor state.
///
/// Checks run in a fixed order so every replica reports the same error for
/// the same input: game over, bounds, piece ownership and turn, own-piece
/// capture, movement pattern, king safety. The input state is never
/// modified.
pub fn apply_move(
    state: &GameState,
    from: Position,
    to: Position,
    mover: Color,
) -> Result<GameState, MoveError> {
    if state.status.is_terminal() {
        return Err(MoveError::GameOver);
    }
    if !from.is_valid() || !to.is_valid() {
        return Err(MoveError::OutOfBounds);
    }

    let piece = state.board.get(from).ok_or(MoveError::NoPiece(from))?;
    if mover != state.turn || piece.color != mover {
        return Err(MoveError::WrongTurn(mover));
    }
    if from == to {
        return Err(MoveError::IllegalMove { kind: piece.kind });
    }

    let captured = state.board.get(to);
    if captured.is_some_and(|target| target.color == mover) {
        return Err(MoveError::IllegalCapture(to));
    }

    check_pattern(&state.board, piece, from, to)?;

    let board = play(&state.board, from, to);
    if in_check(&board, mover) {
        return Err(MoveError::SelfCheck);
    }
    for color in [Color::White, Color::Black] {
        if board.count_kings(color) != 1 {
            return Err(MoveError::MissingKing(color));
        }
    }

    let turn = mover.opponent();
    let status = evaluate_status(&board, turn);

    let mut history = state.history.clone();
    history.push(notation::describe(piece, from, to, captured.is_some(), status));

    Ok(GameState {
        turn,
        white_player: state.white_player.clone(),
        black_player: state.black_player.clone(),
        history,
        board,
        status,
    })
}

/// Move a piece on a copy of the board without any checks.
fn play(board: &Board, from: Position, to: Position) -> Board {
    let mut next = board.clone();
    next.set(to, board.get(from));
    next.set(from, None);
    next
}

/// Every legal move for `color` on `board`.
///
/// Unsupported special moves are not counted as legal.
pub fn legal_moves(board: &Board, color: Color) -> Vec<MoveAction> {
    let targets: Vec<Position> = (0..8u8)
        .flat_map(|row| (0..8u8).map(move |col| Position::new(row, col)))
        .collect();

    let mut moves = Vec::new();
    for (from, piece) in board.pieces().filter(|(_, p)| p.color == color) {
        for &to in &targets {
            if from == to || board.get(to).is_some_and(|p| p.color == color) {
                continue;
            }
            if check_pattern(board, piece, from, to).is_err() {
                continue;
            }
            if !in_check(&play(board, from, to), color) {
                moves.push(MoveAction::new(from, to));
            }
        }
    }
    moves
}

/// Classify the position for the side about to move.
pub fn evaluate_status(board: &Board, to_move: Color) -> GameStatus {
    let checked = in_check(board, to_move);
    let can_move = !legal_moves(board, to_move).is_empty();
    match (checked, can_move) {
        (true, false) => GameStatus::Checkmate {
            winner: to_move.opponent(),
        },
        (false, false) => GameStatus::Stalemate,
        (true, true) => GameStatus::Check,
        (false, true) => GameStatus::Ongoing,
    }
}
