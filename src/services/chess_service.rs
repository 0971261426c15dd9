use std::collections::HashMap;

use chess::{BitBoard, Board, BoardStatus, ChessMove, Piece};

use crate::models::game_record::{GameEndReason, GameResult};
use crate::models::room::PlayerColor;
use crate::services::errors::chess_service_errors::ChessServiceError;

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Dark squares, for the same-coloured-bishops draw check.
const DARK_SQUARES: BitBoard = BitBoard(0xAA55_AA55_AA55_AA55);

/// How a finished game ended, from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub result: GameResult,
    pub reason: GameEndReason,
}

/// The authoritative position of one game.
///
/// Wraps the `chess` crate's move generation and adds the bookkeeping the
/// board itself does not carry: ply count, the halfmove clock for the
/// fifty-move rule, the fullmove number, and position counts for threefold
/// repetition.
#[derive(Debug, Clone)]
pub struct GameEngine {
    board: Board,
    ply: u32,
    halfmove_clock: u32,
    fullmove_number: u32,
    position_counts: HashMap<String, u32>,
}

impl Default for GameEngine {
    fn default() -> Self {
        GameEngine::new()
    }
}

impl GameEngine {
    pub fn new() -> Self {
        let board = Board::default();
        let mut position_counts = HashMap::new();
        position_counts.insert(position_key(&board), 1);
        GameEngine {
            board,
            ply: 0,
            halfmove_clock: 0,
            fullmove_number: 1,
            position_counts,
        }
    }

    pub fn turn(&self) -> PlayerColor {
        match self.board.side_to_move() {
            chess::Color::White => PlayerColor::White,
            chess::Color::Black => PlayerColor::Black,
        }
    }

    pub fn ply_count(&self) -> u32 {
        self.ply
    }

    /// Full FEN of the current position, including the halfmove clock and
    /// fullmove number tracked here.
    pub fn fen(&self) -> String {
        format!(
            "{} {} {}",
            position_key(&self.board),
            self.halfmove_clock,
            self.fullmove_number
        )
    }

    /// Validate a SAN move against the current position and apply it.
    /// Check/mate suffixes are accepted and ignored.
    pub fn apply_san(&mut self, san: &str) -> Result<(), ChessServiceError> {
        if self.outcome().is_some() {
            return Err(ChessServiceError::GameOver);
        }

        let trimmed = san.trim().trim_end_matches(['+', '#', '!', '?']);
        if trimmed.is_empty() {
            return Err(ChessServiceError::InvalidMove(san.to_string()));
        }
        let chess_move = ChessMove::from_san(&self.board, trimmed)
            .map_err(|_| ChessServiceError::InvalidMove(san.to_string()))?;

        let mover = self.board.side_to_move();
        let moved_piece = self.board.piece_on(chess_move.get_source());
        let is_pawn_move = moved_piece == Some(Piece::Pawn);
        // A pawn changing file without a piece on the target is en passant.
        let is_capture = self.board.piece_on(chess_move.get_dest()).is_some()
            || (is_pawn_move && chess_move.get_source().get_file() != chess_move.get_dest().get_file());

        self.board = self.board.make_move_new(chess_move);
        self.ply += 1;
        if is_pawn_move || is_capture {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock += 1;
        }
        if mover == chess::Color::Black {
            self.fullmove_number += 1;
        }
        *self
            .position_counts
            .entry(position_key(&self.board))
            .or_insert(0) += 1;

        Ok(())
    }

    /// Terminal state of the current position, if any. Draw reasons are
    /// ranked: stalemate, then repetition, then insufficient material, then
    /// the fifty-move rule.
    pub fn outcome(&self) -> Option<GameOutcome> {
        match self.board.status() {
            BoardStatus::Checkmate => {
                // The side to move has no moves and is in check; the side
                // that just moved wins.
                let winner = match self.board.side_to_move() {
                    chess::Color::White => PlayerColor::Black,
                    chess::Color::Black => PlayerColor::White,
                };
                return Some(GameOutcome {
                    result: GameResult::for_winner(winner),
                    reason: GameEndReason::Checkmate,
                });
            }
            BoardStatus::Stalemate => {
                return Some(GameOutcome {
                    result: GameResult::Draw,
                    reason: GameEndReason::Stalemate,
                });
            }
            BoardStatus::Ongoing => {}
        }

        if self
            .position_counts
            .get(&position_key(&self.board))
            .copied()
            .unwrap_or(0)
            >= 3
        {
            return Some(GameOutcome {
                result: GameResult::Draw,
                reason: GameEndReason::Repetition,
            });
        }
        if insufficient_material(&self.board) {
            return Some(GameOutcome {
                result: GameResult::Draw,
                reason: GameEndReason::Insufficient,
            });
        }
        if self.halfmove_clock >= 100 {
            return Some(GameOutcome {
                result: GameResult::Draw,
                reason: GameEndReason::FiftyMove,
            });
        }
        None
    }
}

/// The first four FEN fields: piece placement, side to move, castling
/// rights, en passant target. Exactly the part that identifies a position
/// for repetition purposes.
fn position_key(board: &Board) -> String {
    board
        .to_string()
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Neither side can possibly deliver mate: bare kings, a single minor
/// piece, or same-coloured bishops only.
fn insufficient_material(board: &Board) -> bool {
    let pawns = board.pieces(Piece::Pawn).popcnt();
    let rooks = board.pieces(Piece::Rook).popcnt();
    let queens = board.pieces(Piece::Queen).popcnt();
    if pawns + rooks + queens > 0 {
        return false;
    }

    let knights = board.pieces(Piece::Knight).popcnt();
    let bishops = *board.pieces(Piece::Bishop);
    if knights + bishops.popcnt() <= 1 {
        return true;
    }
    if knights == 0 {
        let on_dark = bishops & DARK_SQUARES;
        return on_dark == bishops || on_dark == BitBoard(0);
    }
    false
}
