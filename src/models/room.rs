use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::models::game_record::MoveRecord;
use crate::models::message::ServerMessage;
use crate::models::time_control::TimeControl;
use crate::services::chess_service::GameEngine;
use crate::services::timer_service::ScheduledTask;

/// Board side. Serialised as `"w"` / `"b"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerColor {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl PlayerColor {
    pub fn opponent(self) -> PlayerColor {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerColor::White => "w",
            PlayerColor::Black => "b",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// One seat in a room. The slot survives its connection: a disconnected
/// player keeps the seat until the grace period forfeits the game.
#[derive(Debug)]
pub struct PlayerSlot {
    pub session_id: String,
    pub name: String,
    pub sender: Option<UnboundedSender<ServerMessage>>,
    pub connected: bool,
    pub disconnected_at: Option<i64>,
}

impl PlayerSlot {
    pub fn new(session_id: &str, name: &str, sender: UnboundedSender<ServerMessage>) -> Self {
        PlayerSlot {
            session_id: session_id.to_string(),
            name: name.to_string(),
            sender: Some(sender),
            connected: true,
            disconnected_at: None,
        }
    }

    /// Queue a frame for this player. A missing or closed connection makes
    /// this a silent no-op.
    pub fn send(&self, message: ServerMessage) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(message);
        }
    }

    pub fn attach(&mut self, sender: UnboundedSender<ServerMessage>) {
        self.sender = Some(sender);
        self.connected = true;
        self.disconnected_at = None;
    }

    pub fn detach(&mut self, at_ms: i64) {
        self.sender = None;
        self.connected = false;
        self.disconnected_at = Some(at_ms);
    }
}

/// Remaining time per side, as sent on the wire (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockPair {
    pub w: i64,
    pub b: i64,
}

/// Countdown state for a clocked game. All values in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ClockState {
    pub white_ms: i64,
    pub black_ms: i64,
    pub increment_ms: i64,
    pub last_move_at: Option<i64>,
}

impl ClockState {
    pub fn from_time_control(time_control: &TimeControl) -> Option<ClockState> {
        let initial = time_control.initial_ms()?;
        Some(ClockState {
            white_ms: initial,
            black_ms: initial,
            increment_ms: time_control.increment_ms().unwrap_or(0),
            last_move_at: None,
        })
    }

    pub fn remaining(&self, color: PlayerColor) -> i64 {
        match color {
            PlayerColor::White => self.white_ms,
            PlayerColor::Black => self.black_ms,
        }
    }

    pub fn remaining_mut(&mut self, color: PlayerColor) -> &mut i64 {
        match color {
            PlayerColor::White => &mut self.white_ms,
            PlayerColor::Black => &mut self.black_ms,
        }
    }

    pub fn pair(&self) -> ClockPair {
        ClockPair {
            w: self.white_ms,
            b: self.black_ms,
        }
    }

    /// Live values as an observer should see them: the side to move is
    /// charged for the time since the last move, the waiting side reads
    /// verbatim. Never negative.
    pub fn display(&self, to_move: PlayerColor, now_ms: i64) -> ClockPair {
        let mut pair = self.pair();
        if let Some(last) = self.last_move_at {
            let live = (self.remaining(to_move) - (now_ms - last)).max(0);
            match to_move {
                PlayerColor::White => pair.w = live,
                PlayerColor::Black => pair.b = live,
            }
        }
        pair
    }
}

/// A live game room: two seats, the authoritative position, the move log,
/// the clocks, and any pending offer or timer.
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    pub time_control: TimeControl,
    pub engine: GameEngine,
    pub moves: Vec<MoveRecord>,
    pub clocks: Option<ClockState>,
    /// Archive id of the game in progress. Assigned at the transition to
    /// `Playing`; a rematch gets a fresh one.
    pub game_id: Option<String>,
    pub white: PlayerSlot,
    pub black: Option<PlayerSlot>,
    pub draw_offered_by: Option<PlayerColor>,
    pub rematch_offered_by: Option<PlayerColor>,
    pub grace_timer: Option<ScheduledTask>,
    pub cleanup_timer: Option<ScheduledTask>,
}

impl Room {
    /// A fresh room in `Waiting` with the creator seated as white.
    pub fn new(code: &str, time_control: TimeControl, creator: PlayerSlot) -> Self {
        Room {
            code: code.to_string(),
            status: RoomStatus::Waiting,
            time_control,
            engine: GameEngine::new(),
            moves: Vec::new(),
            clocks: None,
            game_id: None,
            white: creator,
            black: None,
            draw_offered_by: None,
            rematch_offered_by: None,
            grace_timer: None,
            cleanup_timer: None,
        }
    }

    pub fn color_of(&self, session_id: &str) -> Option<PlayerColor> {
        if self.white.session_id == session_id {
            return Some(PlayerColor::White);
        }
        match &self.black {
            Some(slot) if slot.session_id == session_id => Some(PlayerColor::Black),
            _ => None,
        }
    }

    pub fn slot(&self, color: PlayerColor) -> Option<&PlayerSlot> {
        match color {
            PlayerColor::White => Some(&self.white),
            PlayerColor::Black => self.black.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, color: PlayerColor) -> Option<&mut PlayerSlot> {
        match color {
            PlayerColor::White => Some(&mut self.white),
            PlayerColor::Black => self.black.as_mut(),
        }
    }

    pub fn send_to(&self, color: PlayerColor, message: ServerMessage) {
        if let Some(slot) = self.slot(color) {
            slot.send(message);
        }
    }

    pub fn broadcast(&self, message: ServerMessage) {
        self.white.send(message.clone());
        if let Some(black) = &self.black {
            black.send(message);
        }
    }

    pub fn opponent_name(&self, color: PlayerColor) -> String {
        self.slot(color.opponent())
            .map(|slot| slot.name.clone())
            .unwrap_or_default()
    }

    /// Sessions seated in this room, for registry upkeep.
    pub fn sessions(&self) -> Vec<String> {
        let mut sessions = vec![self.white.session_id.clone()];
        if let Some(black) = &self.black {
            sessions.push(black.session_id.clone());
        }
        sessions
    }
}
