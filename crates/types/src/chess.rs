//! Chess data model: colors, pieces, positions, boards and game state.
//!
//! Coordinates are row-major with row 0 being white's back rank, so the
//! square `e2` is `Position { row: 1, col: 4 }`.

use crate::{Hash, PublicKey, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain tag for game state hashing.
const DOMAIN_GAME_STATE: &[u8] = b"gambit:state:";

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Row delta of a single pawn step.
    pub fn pawn_direction(self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// Back rank row.
    pub fn home_row(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// Row the pawns start on.
    pub fn pawn_row(self) -> u8 {
        match self {
            Color::White => 1,
            Color::Black => 6,
        }
    }

    /// Row on which a pawn of this color would promote.
    pub fn promotion_row(self) -> u8 {
        self.opponent().home_row()
    }

    fn tag(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// Algebraic letter (pawns have none).
    pub fn letter(self) -> Option<char> {
        match self {
            PieceKind::King => Some('K'),
            PieceKind::Queen => Some('Q'),
            PieceKind::Rook => Some('R'),
            PieceKind::Bishop => Some('B'),
            PieceKind::Knight => Some('N'),
            PieceKind::Pawn => None,
        }
    }

    fn tag(self) -> u8 {
        match self {
            PieceKind::King => 1,
            PieceKind::Queen => 2,
            PieceKind::Rook => 3,
            PieceKind::Bishop => 4,
            PieceKind::Knight => 5,
            PieceKind::Pawn => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(color: Color, kind: PieceKind) -> Self {
        Self { color, kind }
    }

    /// Board symbol: uppercase for white, lowercase for black.
    pub fn symbol(&self) -> char {
        let letter = self.kind.letter().unwrap_or('P');
        match self.color {
            Color::White => letter,
            Color::Black => letter.to_ascii_lowercase(),
        }
    }

    fn tag(&self) -> u8 {
        self.color.tag() * 8 + self.kind.tag()
    }
}

/// A square on the board.
///
/// Positions arrive from untrusted clients, so out-of-range values are
/// representable and must be checked with [`Position::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

impl Position {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// Whether the position lies on the 8x8 board.
    pub fn is_valid(&self) -> bool {
        self.row < 8 && self.col < 8
    }

    /// Step by a signed delta, returning None if the result leaves the board.
    pub fn offset(&self, d_row: i8, d_col: i8) -> Option<Position> {
        let row = self.row as i16 + d_row as i16;
        let col = self.col as i16 + d_col as i16;
        if (0..8).contains(&row) && (0..8).contains(&col) {
            Some(Position::new(row as u8, col as u8))
        } else {
            None
        }
    }

    /// Parse algebraic notation such as `e2`.
    pub fn from_notation(notation: &str) -> Option<Position> {
        let bytes = notation.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].to_ascii_lowercase();
        let rank = bytes[1];
        if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
            return None;
        }
        Some(Position::new(rank - b'1', file - b'a'))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}{}", (b'a' + self.col) as char, self.row + 1)
        } else {
            write!(f, "({},{})", self.row, self.col)
        }
    }
}

/// An 8x8 grid of optional pieces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    /// A board with no pieces.
    pub fn empty() -> Self {
        Self {
            squares: [[None; 8]; 8],
        }
    }

    /// The standard starting position.
    pub fn standard() -> Self {
        const BACK_RANK: [PieceKind; 8] = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];

        let mut board = Self::empty();
        for color in [Color::White, Color::Black] {
            for (col, kind) in BACK_RANK.iter().enumerate() {
                board.squares[color.home_row() as usize][col] = Some(Piece::new(color, *kind));
                board.squares[color.pawn_row() as usize][col] =
                    Some(Piece::new(color, PieceKind::Pawn));
            }
        }
        board
    }

    /// Piece at a position (None when empty or off the board).
    pub fn get(&self, pos: Position) -> Option<Piece> {
        if !pos.is_valid() {
            return None;
        }
        self.squares[pos.row as usize][pos.col as usize]
    }

    /// Place or clear a square. Off-board positions are ignored.
    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        if pos.is_valid() {
            self.squares[pos.row as usize][pos.col as usize] = piece;
        }
    }

    /// All pieces with their positions, in row-major order.
    pub fn pieces(&self) -> impl Iterator<Item = (Position, Piece)> + '_ {
        self.squares.iter().enumerate().flat_map(|(row, rank)| {
            rank.iter().enumerate().filter_map(move |(col, square)| {
                square.map(|piece| (Position::new(row as u8, col as u8), piece))
            })
        })
    }

    /// Position of a color's king, if present.
    pub fn king_position(&self, color: Color) -> Option<Position> {
        self.pieces()
            .find(|(_, p)| p.color == color && p.kind == PieceKind::King)
            .map(|(pos, _)| pos)
    }

    /// Number of kings of a color (exactly one in any legal position).
    pub fn count_kings(&self, color: Color) -> usize {
        self.pieces()
            .filter(|(_, p)| p.color == color && p.kind == PieceKind::King)
            .count()
    }

    fn canonical_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        for (pos, piece) in self.pieces() {
            out[pos.row as usize * 8 + pos.col as usize] = piece.tag();
        }
        out
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..8u8).rev() {
            write!(f, "{} ", row + 1)?;
            for col in 0..8u8 {
                let symbol = self
                    .get(Position::new(row, col))
                    .map(|p| p.symbol())
                    .unwrap_or('.');
                write!(f, "{}", symbol)?;
            }
            writeln!(f)?;
        }
        write!(f, "  abcdefgh")
    }
}

/// Outcome classification after the last committed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Ongoing,
    /// Side to move is in check but has a legal reply.
    Check,
    Checkmate { winner: Color },
    Stalemate,
}

impl GameStatus {
    /// Whether no further moves are accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Checkmate { .. } | GameStatus::Stalemate)
    }

    fn tag(&self) -> [u8; 2] {
        match self {
            GameStatus::Ongoing => [0, 0],
            GameStatus::Check => [1, 0],
            GameStatus::Checkmate { winner } => [2, winner.tag()],
            GameStatus::Stalemate => [3, 0],
        }
    }
}

/// The replicated state of one chess game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Side to move.
    pub turn: Color,
    pub white_player: PublicKey,
    pub black_player: PublicKey,
    /// Notation of every committed move, oldest first.
    pub history: Vec<String>,
    pub board: Board,
    pub status: GameStatus,
}

impl GameState {
    /// Fresh game in the standard starting position with white to move.
    pub fn new(white_player: PublicKey, black_player: PublicKey) -> Self {
        Self {
            turn: Color::White,
            white_player,
            black_player,
            history: Vec::new(),
            board: Board::standard(),
            status: GameStatus::Ongoing,
        }
    }

    /// Session this game belongs to.
    pub fn session_id(&self) -> SessionId {
        SessionId::for_players(&self.white_player, &self.black_player)
    }

    /// The player who moves `color`.
    pub fn player_for(&self, color: Color) -> &PublicKey {
        match color {
            Color::White => &self.white_player,
            Color::Black => &self.black_player,
        }
    }

    /// The player whose turn it is.
    pub fn player_to_move(&self) -> &PublicKey {
        self.player_for(self.turn)
    }

    /// Color played by a key. White wins ties when a player plays themselves.
    pub fn color_of(&self, player: &PublicKey) -> Option<Color> {
        if *player == self.white_player {
            Some(Color::White)
        } else if *player == self.black_player {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Whether the key plays either side.
    pub fn involves(&self, player: &PublicKey) -> bool {
        self.color_of(player).is_some()
    }

    /// Number of committed moves.
    pub fn move_count(&self) -> u64 {
        self.history.len() as u64
    }

    /// Canonical state hash, used as `prior_state_hash` by clients.
    pub fn hash(&self) -> Hash {
        let mut bytes = Vec::with_capacity(256);
        bytes.extend_from_slice(DOMAIN_GAME_STATE);
        bytes.push(self.turn.tag());
        for key in [&self.white_player, &self.black_player] {
            bytes.extend_from_slice(&(key.as_bytes().len() as u32).to_le_bytes());
            bytes.extend_from_slice(key.as_bytes());
        }
        bytes.extend_from_slice(&(self.history.len() as u32).to_le_bytes());
        for entry in &self.history {
            bytes.extend_from_slice(&(entry.len() as u32).to_le_bytes());
            bytes.extend_from_slice(entry.as_bytes());
        }
        bytes.extend_from_slice(&self.board.canonical_bytes());
        bytes.extend_from_slice(&self.status.tag());
        Hash::from_bytes(&bytes)
    }
}

/// The game `player` takes part in, from games listed newest first.
///
/// An in-progress game wins over any finished one; among finished games the
/// newest is returned.
pub fn current_game_for<T>(
    newest_first: impl IntoIterator<Item = T>,
    player: &PublicKey,
    state_of: impl Fn(&T) -> &GameState,
) -> Option<T> {
    let mut finished = None;
    for game in newest_first {
        let state = state_of(&game);
        if !state.involves(player) {
            continue;
        }
        if !state.status.is_terminal() {
            return Some(game);
        }
        finished.get_or_insert(game);
    }
    finished
}

/// Special moves that are recognised but not played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialMove {
    Castling,
    EnPassant,
    Promotion,
}

impl fmt::Display for SpecialMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialMove::Castling => write!(f, "castling"),
            SpecialMove::EnPassant => write!(f, "en passant"),
            SpecialMove::Promotion => write!(f, "promotion"),
        }
    }
}

/// Reasons a move is rejected by the game state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("position out of bounds")]
    OutOfBounds,

    #[error("no piece at {0}")]
    NoPiece(Position),

    /// The mover is not the side to move, or the piece belongs to the other side.
    #[error("{0} may not move now")]
    WrongTurn(Color),

    #[error("cannot capture own piece at {0}")]
    IllegalCapture(Position),

    #[error("illegal {kind:?} move")]
    IllegalMove { kind: PieceKind },

    #[error("unsupported move: {0}")]
    Unsupported(SpecialMove),

    #[error("move leaves own king in check")]
    SelfCheck,

    #[error("game is over")]
    GameOver,

    #[error("{0} king is not on the board")]
    MissingKing(Color),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn players() -> (PublicKey, PublicKey) {
        (
            KeyPair::from_seed(&[1u8; 32]).public_key(),
            KeyPair::from_seed(&[2u8; 32]).public_key(),
        )
    }

    #[test]
    fn test_standard_board_layout() {
        let board = Board::standard();

        assert_eq!(
            board.get(Position::new(0, 4)),
            Some(Piece::new(Color::White, PieceKind::King))
        );
        assert_eq!(
            board.get(Position::new(7, 3)),
            Some(Piece::new(Color::Black, PieceKind::Queen))
        );
        assert_eq!(
            board.get(Position::new(1, 4)),
            Some(Piece::new(Color::White, PieceKind::Pawn))
        );
        assert_eq!(board.get(Position::new(3, 4)), None);
        assert_eq!(board.pieces().count(), 32);
        assert_eq!(board.count_kings(Color::White), 1);
        assert_eq!(board.count_kings(Color::Black), 1);
    }

    #[test]
    fn test_position_notation() {
        assert_eq!(Position::from_notation("e2"), Some(Position::new(1, 4)));
        assert_eq!(Position::from_notation("a8"), Some(Position::new(7, 0)));
        assert_eq!(Position::from_notation("i1"), None);
        assert_eq!(Position::from_notation("e9"), None);
        assert_eq!(Position::new(3, 4).to_string(), "e4");
        assert_eq!(Position::new(9, 4).to_string(), "(9,4)");
    }

    #[test]
    fn test_position_offset_stays_on_board() {
        let corner = Position::new(0, 0);
        assert_eq!(corner.offset(-1, 0), None);
        assert_eq!(corner.offset(1, 2), Some(Position::new(1, 2)));
        assert_eq!(Position::new(7, 7).offset(1, 0), None);
    }

    #[test]
    fn test_new_game_state() {
        let (white, black) = players();
        let state = GameState::new(white.clone(), black.clone());

        assert_eq!(state.turn, Color::White);
        assert_eq!(state.player_to_move(), &white);
        assert_eq!(state.color_of(&black), Some(Color::Black));
        assert_eq!(state.move_count(), 0);
        assert_eq!(state.board, Board::standard());
    }

    #[test]
    fn test_state_hash_tracks_content() {
        let (white, black) = players();
        let state = GameState::new(white.clone(), black.clone());
        assert_eq!(state.hash(), GameState::new(white.clone(), black.clone()).hash());

        let mut moved = state.clone();
        moved.turn = Color::Black;
        assert_ne!(state.hash(), moved.hash());

        let swapped = GameState::new(black, white);
        assert_ne!(state.hash(), swapped.hash());
    }

    #[test]
    fn test_current_game_prefers_in_progress() {
        let (white, black) = players();
        let third = KeyPair::from_seed(&[3u8; 32]).public_key();

        let oldest = GameState::new(white.clone(), black.clone());
        let mut mated = GameState::new(third.clone(), white.clone());
        mated.status = GameStatus::Checkmate {
            winner: Color::White,
        };
        let mut drawn = GameState::new(black.clone(), white.clone());
        drawn.status = GameStatus::Stalemate;
        let newest_first = [drawn.clone(), mated.clone(), oldest.clone()];

        let found = current_game_for(newest_first.iter(), &white, |s| *s);
        assert_eq!(found, Some(&oldest));

        let found = current_game_for(newest_first.iter(), &third, |s| *s);
        assert_eq!(found, Some(&mated));

        let found = current_game_for(newest_first[..2].iter(), &white, |s| *s);
        assert_eq!(found, Some(&drawn));

        let stranger = KeyPair::from_seed(&[4u8; 32]).public_key();
        assert!(current_game_for(newest_first.iter(), &stranger, |s| *s).is_none());
    }

    #[test]
    fn test_board_display() {
        let rendered = Board::standard().to_string();
        assert!(rendered.starts_with("8 rnbqkbnr"));
        assert!(rendered.contains("1 RNBQKBNR"));
    }
}
