use serde::{Deserialize, Serialize};

use crate::models::game_record::{GameEndReason, GameResult};
use crate::models::room::{ClockPair, PlayerColor};

/// Frames sent by clients. Wire shape is `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Auth { session_id: String },
    #[serde(rename_all = "camelCase")]
    CreateRoom {
        name: Option<String>,
        time_control: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    QuickMatch {
        name: Option<String>,
        time_control: Option<String>,
    },
    CancelQueue {},
    Move { san: String },
    Resign {},
    DrawOffer {},
    DrawRespond { accept: bool },
    RematchOffer {},
    RematchRespond { accept: bool },
}

/// Frames sent to clients, mirrored from the client enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthOk {},
    #[serde(rename_all = "camelCase")]
    RoomCreated { room_id: String, color: PlayerColor },
    #[serde(rename_all = "camelCase")]
    GameStart {
        room_id: String,
        color: PlayerColor,
        fen: String,
        time_control: String,
        opponent_name: String,
    },
    #[serde(rename_all = "camelCase")]
    RematchStart {
        room_id: String,
        color: PlayerColor,
        fen: String,
        time_control: String,
        opponent_name: String,
    },
    Move {
        san: String,
        fen: String,
        clocks: Option<ClockPair>,
    },
    MoveAck { clocks: ClockPair },
    GameEnd {
        result: GameResult,
        reason: GameEndReason,
    },
    DrawOffered {},
    DrawDeclined {},
    RematchOffered {},
    RematchDeclined {},
    OpponentDisconnected { timeout: u64 },
    OpponentReconnected {},
    #[serde(rename_all = "camelCase")]
    Reconnect {
        room_id: String,
        color: PlayerColor,
        fen: String,
        time_control: String,
        moves: Vec<String>,
        clocks: Option<ClockPair>,
        opponent_name: String,
        opponent_connected: bool,
    },
    #[serde(rename_all = "camelCase")]
    QueueJoined { time_control: String, position: usize },
    QueueLeft {},
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
