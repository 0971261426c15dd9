use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::models::room::PlayerColor;

/// Final score of a game, in result notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameResult {
    pub fn for_winner(winner: PlayerColor) -> Self {
        match winner {
            PlayerColor::White => GameResult::WhiteWins,
            PlayerColor::Black => GameResult::BlackWins,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::WhiteWins => "1-0",
            GameResult::BlackWins => "0-1",
            GameResult::Draw => "1/2-1/2",
        }
    }
}

impl Serialize for GameResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEndReason {
    Checkmate,
    Stalemate,
    Repetition,
    Insufficient,
    FiftyMove,
    Timeout,
    Resignation,
    Agreement,
    Abandoned,
}

impl GameEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameEndReason::Checkmate => "checkmate",
            GameEndReason::Stalemate => "stalemate",
            GameEndReason::Repetition => "repetition",
            GameEndReason::Insufficient => "insufficient",
            GameEndReason::FiftyMove => "fifty-move",
            GameEndReason::Timeout => "timeout",
            GameEndReason::Resignation => "resignation",
            GameEndReason::Agreement => "agreement",
            GameEndReason::Abandoned => "abandoned",
        }
    }
}

impl Serialize for GameEndReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for GameEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerMeta {
    pub name: String,
    pub is_ai: bool,
    pub elo: Option<i32>,
}

impl PlayerMeta {
    pub fn human(name: &str) -> Self {
        PlayerMeta {
            name: name.to_string(),
            is_ai: false,
            elo: None,
        }
    }
}

/// Metadata recorded when a game starts.
#[derive(Debug, Clone, Serialize)]
pub struct GameMeta {
    pub game_type: String,
    pub time_control: String,
    pub starting_fen: String,
    pub white: PlayerMeta,
    pub black: PlayerMeta,
}

impl GameMeta {
    pub fn multiplayer(
        time_control: &str,
        starting_fen: &str,
        white_name: &str,
        black_name: &str,
    ) -> Self {
        GameMeta {
            game_type: "multiplayer".to_string(),
            time_control: time_control.to_string(),
            starting_fen: starting_fen.to_string(),
            white: PlayerMeta::human(white_name),
            black: PlayerMeta::human(black_name),
        }
    }
}

/// One half-move, as kept in a room's log and handed to the archive.
/// Ply numbering starts at 0 and is strictly monotonic.
#[derive(Debug, Clone, Serialize)]
pub struct MoveRecord {
    pub ply: u32,
    pub san: String,
    pub fen: String,
    pub timestamp: i64,
    pub side: PlayerColor,
}

/// A stored game: metadata, moves keyed by ply, and the final outcome once
/// the game is finalized.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub id: String,
    pub meta: GameMeta,
    pub moves: BTreeMap<u32, MoveRecord>,
    pub result: Option<GameResult>,
    pub reason: Option<GameEndReason>,
    pub created_at: i64,
    pub ended_at: Option<i64>,
}
