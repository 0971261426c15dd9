use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::models::game_record::{GameEndReason, GameMeta, GameResult, MoveRecord};
use crate::models::message::ServerMessage;
use crate::models::room::{ClockState, PlayerColor, PlayerSlot, Room, RoomStatus};
use crate::models::time_control::TimeControl;
use crate::repositories::game_archive::GameArchive;
use crate::services::chess_service::{GameEngine, STARTING_FEN};
use crate::services::errors::chess_service_errors::ChessServiceError;
use crate::services::errors::room_service_errors::RoomServiceError;
use crate::services::timer_service;

/// Visually unambiguous room-code alphabet: no `I`, `O`, `0`, `1`.
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ROOM_CODE_LEN: usize = 6;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// One side of a freshly paired match, as handed over by the matchmaker.
pub struct MatchedPlayer {
    pub session_id: String,
    pub name: String,
    pub sender: UnboundedSender<ServerMessage>,
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<String, Room>,
    /// `session → room code`; authoritative for "is this session seated".
    session_rooms: HashMap<String, String>,
}

/// Owns every live room and the session-to-room map. All mutation happens
/// under one lock, so room events (messages and timer callbacks alike) are
/// serialized.
pub struct RoomService {
    config: Arc<ServerConfig>,
    archive: Arc<dyn GameArchive>,
    table: Mutex<RoomTable>,
    self_ref: Weak<RoomService>,
}

impl RoomService {
    pub fn new(config: Arc<ServerConfig>, archive: Arc<dyn GameArchive>) -> Arc<Self> {
        Arc::new_cyclic(|weak| RoomService {
            config,
            archive,
            table: Mutex::new(RoomTable::default()),
            self_ref: weak.clone(),
        })
    }

    pub async fn is_seated(&self, session_id: &str) -> bool {
        self.table.lock().await.session_rooms.contains_key(session_id)
    }

    pub async fn room_count(&self) -> usize {
        self.table.lock().await.rooms.len()
    }

    /// `create_room`: open a fresh room in `Waiting` with the caller seated
    /// as white.
    pub async fn create_room(
        &self,
        session_id: &str,
        name: &str,
        time_control_tag: Option<&str>,
        sender: UnboundedSender<ServerMessage>,
    ) -> Result<String, RoomServiceError> {
        let time_control = self.resolve_time_control(time_control_tag)?;

        let mut table = self.table.lock().await;
        if table.session_rooms.contains_key(session_id) {
            return Err(RoomServiceError::AlreadyInGame);
        }

        let code = generate_room_code(&table.rooms);
        let creator = PlayerSlot::new(session_id, name, sender);
        let room = Room::new(&code, time_control, creator);
        room.send_to(
            PlayerColor::White,
            ServerMessage::RoomCreated {
                room_id: code.clone(),
                color: PlayerColor::White,
            },
        );
        table.rooms.insert(code.clone(), room);
        table
            .session_rooms
            .insert(session_id.to_string(), code.clone());
        info!(room = %code, session_id, time_control = %time_control, "Room created");
        Ok(code)
    }

    /// `join_room`: seat the caller as black and start the game.
    pub async fn join_room(
        &self,
        session_id: &str,
        room_code: &str,
        name: &str,
        sender: UnboundedSender<ServerMessage>,
    ) -> Result<(), RoomServiceError> {
        let code = room_code.trim().to_uppercase();
        let mut table = self.table.lock().await;

        let room = table
            .rooms
            .get(&code)
            .ok_or(RoomServiceError::RoomNotFound)?;
        if room.color_of(session_id).is_some() {
            return Err(RoomServiceError::AlreadyInRoom);
        }
        if table.session_rooms.contains_key(session_id) {
            return Err(RoomServiceError::AlreadyInGame);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomServiceError::RoomNotAccepting);
        }

        let meta = GameMeta::multiplayer(
            &room.time_control.tag(),
            &room.engine.fen(),
            &room.white.name,
            name,
        );
        let game_id = self.archive.create_game(&meta).await?;

        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let room = rooms.get_mut(&code).ok_or(RoomServiceError::RoomNotFound)?;
        room.black = Some(PlayerSlot::new(session_id, name, sender));
        session_rooms.insert(session_id.to_string(), code.clone());
        start_game(room, game_id, now_ms());
        info!(room = %code, session_id, "Second player joined, game started");
        Ok(())
    }

    /// Seat a matchmade pair directly into a playing room. Colours are the
    /// matchmaker's coin flip; pairing stays atomic because the caller holds
    /// the queue lock across this call.
    pub async fn create_matched(
        &self,
        white: MatchedPlayer,
        black: MatchedPlayer,
        time_control_tag: &str,
    ) -> Result<String, RoomServiceError> {
        let time_control = self.resolve_time_control(Some(time_control_tag))?;
        let meta_white = white.name.clone();
        let meta_black = black.name.clone();

        let mut table = self.table.lock().await;
        let code = generate_room_code(&table.rooms);

        let mut room = Room::new(
            &code,
            time_control,
            PlayerSlot::new(&white.session_id, &white.name, white.sender),
        );
        room.black = Some(PlayerSlot::new(&black.session_id, &black.name, black.sender));

        let meta = GameMeta::multiplayer(
            &time_control.tag(),
            &room.engine.fen(),
            &meta_white,
            &meta_black,
        );
        let game_id = self.archive.create_game(&meta).await?;

        table
            .session_rooms
            .insert(white.session_id.clone(), code.clone());
        table
            .session_rooms
            .insert(black.session_id.clone(), code.clone());
        start_game(&mut room, game_id, now_ms());
        table.rooms.insert(code.clone(), room);
        info!(room = %code, time_control = %time_control, "Matched game started");
        Ok(code)
    }

    pub async fn handle_move(&self, session_id: &str, san: &str) -> Result<(), RoomServiceError> {
        self.handle_move_at(session_id, san, now_ms()).await
    }

    /// The move pipeline. Any failure leaves the room untouched and
    /// surfaces as an `error` frame to the sender.
    pub async fn handle_move_at(
        &self,
        session_id: &str,
        san: &str,
        now_ms: i64,
    ) -> Result<(), RoomServiceError> {
        let mut table = self.table.lock().await;
        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let code = session_rooms
            .get(session_id)
            .ok_or(RoomServiceError::NotInRoom)?;
        let room = rooms.get_mut(code).ok_or(RoomServiceError::NotInRoom)?;

        if room.status != RoomStatus::Playing {
            return Err(RoomServiceError::GameNotInProgress);
        }
        let mover = room
            .color_of(session_id)
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        if room.engine.turn() != mover {
            return Err(RoomServiceError::NotYourTurn);
        }

        let may_flag = room.clocks.is_some() && !room.moves.is_empty();
        let engine_before = may_flag.then(|| room.engine.clone());
        room.engine.apply_san(san).map_err(|err| match err {
            ChessServiceError::GameOver => RoomServiceError::GameNotInProgress,
            ChessServiceError::InvalidMove(_) => RoomServiceError::InvalidMove,
        })?;
        let fen = room.engine.fen();

        // Clock arithmetic. The opening move carries no deduction; clocks
        // only start counting against a side once the first move is down.
        let first_move = room.moves.is_empty();
        if let Some(clocks) = room.clocks.as_mut() {
            if !first_move {
                if let Some(last) = clocks.last_move_at {
                    let elapsed = now_ms - last;
                    *clocks.remaining_mut(mover) -= elapsed;
                    if clocks.remaining(mover) <= 0 {
                        *clocks.remaining_mut(mover) = 0;
                        // The flagged move never happened: the log stays
                        // frozen at the pre-move position.
                        if let Some(engine_before) = engine_before {
                            room.engine = engine_before;
                        }
                        let result = GameResult::for_winner(mover.opponent());
                        self.finalize(room, result, GameEndReason::Timeout).await;
                        return Ok(());
                    }
                    *clocks.remaining_mut(mover) += clocks.increment_ms;
                }
            }
            clocks.last_move_at = Some(now_ms);
        }

        let record = MoveRecord {
            ply: room.moves.len() as u32,
            san: san.to_string(),
            fen: fen.clone(),
            timestamp: now_ms,
            side: mover,
        };
        room.moves.push(record.clone());
        if let Some(game_id) = room.game_id.clone() {
            if let Err(err) = self.archive.append_move(&game_id, &record).await {
                warn!(game_id = %game_id, error = %err, "Failed to persist move");
            }
        }

        let clocks = room.clocks.map(|c| c.pair());
        room.send_to(
            mover.opponent(),
            ServerMessage::Move {
                san: record.san.clone(),
                fen: fen.clone(),
                clocks,
            },
        );
        if let Some(clocks) = clocks {
            room.send_to(mover, ServerMessage::MoveAck { clocks });
        }

        if let Some(outcome) = room.engine.outcome() {
            self.finalize(room, outcome.result, outcome.reason).await;
        }
        Ok(())
    }

    pub async fn resign(&self, session_id: &str) -> Result<(), RoomServiceError> {
        let mut table = self.table.lock().await;
        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let code = session_rooms
            .get(session_id)
            .ok_or(RoomServiceError::NotInRoom)?;
        let room = rooms.get_mut(code).ok_or(RoomServiceError::NotInRoom)?;
        if room.status != RoomStatus::Playing {
            return Err(RoomServiceError::GameNotInProgress);
        }
        let resigner = room
            .color_of(session_id)
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        let result = GameResult::for_winner(resigner.opponent());
        self.finalize(room, result, GameEndReason::Resignation).await;
        Ok(())
    }

    pub async fn draw_offer(&self, session_id: &str) -> Result<(), RoomServiceError> {
        let mut table = self.table.lock().await;
        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let code = session_rooms
            .get(session_id)
            .ok_or(RoomServiceError::NotInRoom)?;
        let room = rooms.get_mut(code).ok_or(RoomServiceError::NotInRoom)?;
        if room.status != RoomStatus::Playing {
            return Err(RoomServiceError::GameNotInProgress);
        }
        let offerer = room
            .color_of(session_id)
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        // Duplicate offers simply re-notify.
        room.draw_offered_by = Some(offerer);
        room.send_to(offerer.opponent(), ServerMessage::DrawOffered {});
        Ok(())
    }

    pub async fn draw_respond(
        &self,
        session_id: &str,
        accept: bool,
    ) -> Result<(), RoomServiceError> {
        let mut table = self.table.lock().await;
        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let code = session_rooms
            .get(session_id)
            .ok_or(RoomServiceError::NotInRoom)?;
        let room = rooms.get_mut(code).ok_or(RoomServiceError::NotInRoom)?;
        if room.status != RoomStatus::Playing {
            return Err(RoomServiceError::GameNotInProgress);
        }
        let responder = room
            .color_of(session_id)
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        if room.draw_offered_by != Some(responder.opponent()) {
            return Err(RoomServiceError::NoDrawOffer);
        }
        room.draw_offered_by = None;
        if accept {
            self.finalize(room, GameResult::Draw, GameEndReason::Agreement)
                .await;
        } else {
            room.send_to(responder.opponent(), ServerMessage::DrawDeclined {});
        }
        Ok(())
    }

    pub async fn rematch_offer(&self, session_id: &str) -> Result<(), RoomServiceError> {
        let mut table = self.table.lock().await;
        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let code = session_rooms
            .get(session_id)
            .ok_or(RoomServiceError::NotInRoom)?;
        let room = rooms.get_mut(code).ok_or(RoomServiceError::NotInRoom)?;
        if room.status != RoomStatus::Finished {
            return Err(RoomServiceError::GameNotFinished);
        }
        let offerer = room
            .color_of(session_id)
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        room.rematch_offered_by = Some(offerer);
        room.send_to(offerer.opponent(), ServerMessage::RematchOffered {});
        Ok(())
    }

    pub async fn rematch_respond(
        &self,
        session_id: &str,
        accept: bool,
    ) -> Result<(), RoomServiceError> {
        let mut table = self.table.lock().await;
        let RoomTable {
            rooms,
            session_rooms,
        } = &mut *table;
        let code = session_rooms
            .get(session_id)
            .ok_or(RoomServiceError::NotInRoom)?
            .clone();
        let room = rooms.get_mut(&code).ok_or(RoomServiceError::NotInRoom)?;
        if room.status != RoomStatus::Finished {
            return Err(RoomServiceError::GameNotFinished);
        }
        let responder = room
            .color_of(session_id)
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        if room.rematch_offered_by != Some(responder.opponent()) {
            return Err(RoomServiceError::NoRematchOffer);
        }
        room.rematch_offered_by = None;
        if !accept {
            room.send_to(responder.opponent(), ServerMessage::RematchDeclined {});
            return Ok(());
        }
        if room.black.is_none() {
            return Err(RoomServiceError::NotPlayerInRoom);
        }

        // Persist first; the room only mutates once the new game id exists.
        // The old black plays white next game, and vice versa.
        let meta = GameMeta::multiplayer(
            &room.time_control.tag(),
            STARTING_FEN,
            &room.opponent_name(PlayerColor::White),
            &room.opponent_name(PlayerColor::Black),
        );
        let game_id = self.archive.create_game(&meta).await?;

        // Colours swap; everything else starts fresh under the new game id.
        let room = rooms.get_mut(&code).ok_or(RoomServiceError::NotInRoom)?;
        let new_white = room
            .black
            .take()
            .ok_or(RoomServiceError::NotPlayerInRoom)?;
        let new_black = std::mem::replace(&mut room.white, new_white);
        room.black = Some(new_black);

        room.engine = GameEngine::new();
        room.moves.clear();
        room.clocks = None;
        room.draw_offered_by = None;
        room.grace_timer = None;
        room.cleanup_timer = None;
        let now = now_ms();
        start_game_frames(room, game_id, now, true);
        info!(room = %code, "Rematch started with colours swapped");

        // Grace state from the previous game is gone; a seat that is still
        // vacant of a live connection gets a fresh countdown.
        for color in [PlayerColor::White, PlayerColor::Black] {
            let disconnected = room.slot(color).map(|s| !s.connected).unwrap_or(false);
            if disconnected {
                if let Some(slot) = room.slot_mut(color) {
                    slot.disconnected_at = Some(now);
                }
                self.arm_grace(room, color, self.config.disconnect_grace);
                room.send_to(
                    color.opponent(),
                    ServerMessage::OpponentDisconnected {
                        timeout: self.config.disconnect_grace.as_secs(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Transport-level close for the session's active connection.
    pub async fn handle_disconnect(&self, session_id: &str) {
        let now = now_ms();
        let mut table = self.table.lock().await;
        let Some(code) = table.session_rooms.get(session_id).cloned() else {
            return;
        };
        let (status, color) = {
            let Some(room) = table.rooms.get(&code) else {
                return;
            };
            let Some(color) = room.color_of(session_id) else {
                return;
            };
            (room.status, color)
        };

        match status {
            RoomStatus::Waiting => {
                // Sole player left; the room dies with the connection.
                info!(room = %code, session_id, "Creator disconnected, discarding waiting room");
                drop_room(&mut table, &code);
            }
            RoomStatus::Playing => {
                let Some(room) = table.rooms.get_mut(&code) else {
                    return;
                };
                if let Some(slot) = room.slot_mut(color) {
                    slot.detach(now);
                }
                room.send_to(
                    color.opponent(),
                    ServerMessage::OpponentDisconnected {
                        timeout: self.config.disconnect_grace.as_secs(),
                    },
                );
                if room.grace_timer.is_none() {
                    self.arm_grace(room, color, self.config.disconnect_grace);
                }
                info!(room = %code, session_id, color = color.as_str(), "Player disconnected, grace running");
            }
            RoomStatus::Finished => {
                // Cleanup TTL is already running; nothing to schedule.
                if let Some(room) = table.rooms.get_mut(&code) {
                    if let Some(slot) = room.slot_mut(color) {
                        slot.detach(now);
                    }
                }
            }
        }
    }

    pub async fn handle_reconnect(
        &self,
        session_id: &str,
        sender: UnboundedSender<ServerMessage>,
    ) {
        self.handle_reconnect_at(session_id, sender, now_ms()).await
    }

    /// A fresh connection authenticated with a seated session: swap the
    /// seat's connection, stop the grace countdown, and replay state.
    pub async fn handle_reconnect_at(
        &self,
        session_id: &str,
        sender: UnboundedSender<ServerMessage>,
        now_ms: i64,
    ) {
        let mut table = self.table.lock().await;
        let Some(code) = table.session_rooms.get(session_id).cloned() else {
            return;
        };
        let Some(room) = table.rooms.get_mut(&code) else {
            return;
        };
        let Some(color) = room.color_of(session_id) else {
            return;
        };

        if let Some(slot) = room.slot_mut(color) {
            slot.attach(sender);
        }
        room.grace_timer = None;

        if room.status == RoomStatus::Playing {
            let clocks = room
                .clocks
                .map(|c| c.display(room.engine.turn(), now_ms));
            let frame = ServerMessage::Reconnect {
                room_id: code.clone(),
                color,
                fen: room.engine.fen(),
                time_control: room.time_control.tag(),
                moves: room.moves.iter().map(|m| m.san.clone()).collect(),
                clocks,
                opponent_name: room.opponent_name(color),
                opponent_connected: room
                    .slot(color.opponent())
                    .map(|s| s.connected)
                    .unwrap_or(false),
            };
            room.send_to(color, frame);
            room.send_to(color.opponent(), ServerMessage::OpponentReconnected {});
            info!(room = %code, session_id, color = color.as_str(), "Player reconnected");

            // The single grace timer may have been watching this seat; if
            // the other seat is still empty it gets the remainder of its
            // own countdown.
            let opponent = color.opponent();
            if let Some(opp) = room.slot(opponent) {
                if !opp.connected {
                    let elapsed = opp
                        .disconnected_at
                        .map(|at| (now_ms - at).max(0) as u64)
                        .unwrap_or(0);
                    let remaining = self
                        .config
                        .disconnect_grace
                        .saturating_sub(Duration::from_millis(elapsed));
                    self.arm_grace(room, opponent, remaining);
                }
            }
        }
    }

    /// Grace countdown fired: if the seat is still empty and the game still
    /// running, the absent player forfeits.
    async fn handle_grace_expired(&self, code: &str, color: PlayerColor) {
        let mut table = self.table.lock().await;
        let Some(room) = table.rooms.get_mut(code) else {
            return;
        };
        // This callback IS the stored timer; release the handle without
        // aborting the task that is running right now.
        if let Some(timer) = room.grace_timer.take() {
            timer.disarm();
        }
        if room.status != RoomStatus::Playing {
            return;
        }
        let still_gone = room.slot(color).map(|s| !s.connected).unwrap_or(false);
        if !still_gone {
            return;
        }
        info!(room = %code, color = color.as_str(), "Disconnect grace expired, forfeiting");
        let result = GameResult::for_winner(color.opponent());
        self.finalize(room, result, GameEndReason::Abandoned).await;
    }

    /// Finished-room TTL fired: drop the room, its registry entries, and
    /// all of its timers.
    pub async fn cleanup(&self, code: &str) {
        let mut table = self.table.lock().await;
        // Release our own handle before the room (and its timers) drop.
        if let Some(room) = table.rooms.get_mut(code) {
            if let Some(timer) = room.cleanup_timer.take() {
                timer.disarm();
            }
        }
        if drop_room(&mut table, code) {
            info!(room = %code, "Room cleaned up");
        }
    }

    /// `playing → finished`: freeze the log, persist the outcome, notify
    /// both seats, and start the cleanup TTL.
    async fn finalize(&self, room: &mut Room, result: GameResult, reason: GameEndReason) {
        room.status = RoomStatus::Finished;
        room.draw_offered_by = None;
        room.grace_timer = None;

        if let Some(game_id) = room.game_id.clone() {
            if let Err(err) = self.archive.finish_game(&game_id, result, reason).await {
                warn!(game_id = %game_id, error = %err, "Failed to finalize game record");
            }
        }
        room.broadcast(ServerMessage::GameEnd { result, reason });
        info!(room = %room.code, result = %result, reason = %reason, "Game finished");

        if let Some(service) = self.self_ref.upgrade() {
            let code = room.code.clone();
            room.cleanup_timer = Some(timer_service::schedule(
                self.config.room_ttl_after_end,
                async move {
                    service.cleanup(&code).await;
                },
            ));
        }
    }

    fn arm_grace(&self, room: &mut Room, color: PlayerColor, delay: Duration) {
        let Some(service) = self.self_ref.upgrade() else {
            return;
        };
        let code = room.code.clone();
        room.grace_timer = Some(timer_service::schedule(delay, async move {
            service.handle_grace_expired(&code, color).await;
        }));
    }

    fn resolve_time_control(
        &self,
        tag: Option<&str>,
    ) -> Result<TimeControl, RoomServiceError> {
        let tag = match tag {
            // The matchmaking wildcard is not a playable control.
            None | Some(TimeControl::ANY_TAG) => self.config.default_time_control.as_str(),
            Some(tag) => tag,
        };
        TimeControl::parse(tag).ok_or_else(|| {
            RoomServiceError::ValidationError(format!("Invalid time control: {}", tag))
        })
    }
}

/// `waiting → playing`: clocks come up, the archive id is pinned, and both
/// seats learn their colour.
fn start_game(room: &mut Room, game_id: String, now_ms: i64) {
    start_game_frames(room, game_id, now_ms, false)
}

fn start_game_frames(room: &mut Room, game_id: String, now_ms: i64, rematch: bool) {
    room.status = RoomStatus::Playing;
    room.game_id = Some(game_id);
    room.clocks = ClockState::from_time_control(&room.time_control);
    if let Some(clocks) = room.clocks.as_mut() {
        clocks.last_move_at = Some(now_ms);
    }

    for color in [PlayerColor::White, PlayerColor::Black] {
        let frame = if rematch {
            ServerMessage::RematchStart {
                room_id: room.code.clone(),
                color,
                fen: room.engine.fen(),
                time_control: room.time_control.tag(),
                opponent_name: room.opponent_name(color),
            }
        } else {
            ServerMessage::GameStart {
                room_id: room.code.clone(),
                color,
                fen: room.engine.fen(),
                time_control: room.time_control.tag(),
                opponent_name: room.opponent_name(color),
            }
        };
        room.send_to(color, frame);
    }
}

fn drop_room(table: &mut RoomTable, code: &str) -> bool {
    let Some(room) = table.rooms.remove(code) else {
        return false;
    };
    for session in room.sessions() {
        if table.session_rooms.get(&session).map(String::as_str) == Some(code) {
            table.session_rooms.remove(&session);
        }
    }
    // Dropping the room aborts any armed timer.
    true
}

fn generate_room_code(rooms: &HashMap<String, Room>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code: String = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        if !rooms.contains_key(&code) {
            return code;
        }
        debug!(code, "Room code collision, resampling");
    }
}
