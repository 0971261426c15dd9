use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::message::{ClientMessage, ServerMessage};
use crate::models::time_control::TimeControl;
use crate::state::AppState;

const FIRST_FRAME_ERROR: &str = "First message must be auth with sessionId";
const DEFAULT_DISPLAY_NAME: &str = "Anonymous";

pub async fn websocket_route(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per connection: multiplexes the outbound frame queue, the
/// liveness probe, and the inbound socket.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut session_id: Option<String> = None;

    // Proxies silently drop idle TCP, so liveness is application-level: a
    // connection that missed a whole ping window is dead.
    let mut ping = interval_at(
        Instant::now() + state.config.ping_interval,
        state.config.ping_interval,
    );
    let mut awaiting_pong = false;

    info!(%connection_id, "Connection opened");

    loop {
        tokio::select! {
            Some(frame) = rx.recv() => {
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%connection_id, error = %err, "Dropping unserializable frame"),
                }
            }
            _ = ping.tick() => {
                if awaiting_pong {
                    info!(%connection_id, "Liveness probe failed, closing connection");
                    break;
                }
                awaiting_pong = true;
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, connection_id, &mut session_id, &tx, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(%connection_id, error = %err, "Socket error");
                        break;
                    }
                }
            }
        }
    }

    // Only the session's active connection tears state down; a superseded
    // connection closing must not evict the session from its room.
    if state.sessions.unbind(connection_id).is_some() {
        if let Some(session_id) = &session_id {
            state.matchmaking.handle_disconnect(session_id).await;
            state.rooms.handle_disconnect(session_id).await;
        }
    }
    info!(%connection_id, session_id = ?session_id, "Connection closed");
}

/// Parse one inbound frame and route it. All failures become `error`
/// frames; the connection stays open.
async fn handle_frame(
    state: &AppState,
    connection_id: Uuid,
    session_id: &mut Option<String>,
    tx: &UnboundedSender<ServerMessage>,
    text: &str,
) {
    let Ok(mut value) = serde_json::from_str::<Value>(text) else {
        let _ = tx.send(ServerMessage::error("Invalid JSON"));
        return;
    };
    // Empty-payload frames may omit the payload key entirely.
    if let Some(object) = value.as_object_mut() {
        object
            .entry("payload")
            .or_insert_with(|| Value::Object(Default::default()));
    }
    let message = match serde_json::from_value::<ClientMessage>(value) {
        Ok(message) => message,
        Err(err) => {
            let text = if err.to_string().contains("unknown variant") {
                "Unknown message type".to_string()
            } else {
                format!("Invalid payload: {}", err)
            };
            let _ = tx.send(ServerMessage::error(text));
            return;
        }
    };

    // Handshake gate: nothing but auth passes before a session is bound.
    if let ClientMessage::Auth { session_id: declared } = message {
        if session_id.is_some() {
            let _ = tx.send(ServerMessage::error("Already authenticated"));
            return;
        }
        if declared.is_empty() {
            let _ = tx.send(ServerMessage::error(FIRST_FRAME_ERROR));
            return;
        }
        state.sessions.bind(connection_id, &declared);
        *session_id = Some(declared.clone());
        info!(%connection_id, session_id = %declared, "Authenticated");
        let _ = tx.send(ServerMessage::AuthOk {});
        // A session seated in a live game is routed straight back in.
        state.rooms.handle_reconnect(&declared, tx.clone()).await;
        return;
    }

    let Some(session) = session_id.clone() else {
        let _ = tx.send(ServerMessage::error(FIRST_FRAME_ERROR));
        return;
    };
    if let Err(message) = dispatch(state, &session, tx, message).await {
        let _ = tx.send(ServerMessage::error(message));
    }
}

async fn dispatch(
    state: &AppState,
    session_id: &str,
    tx: &UnboundedSender<ServerMessage>,
    message: ClientMessage,
) -> Result<(), String> {
    match message {
        ClientMessage::CreateRoom { name, time_control } => {
            // Creating a room implicitly withdraws any queue entry.
            state.matchmaking.leave(session_id).await;
            state
                .rooms
                .create_room(
                    session_id,
                    &display_name(name),
                    time_control.as_deref(),
                    tx.clone(),
                )
                .await
                .map(|_| ())
                .map_err(|err| err.to_string())
        }
        ClientMessage::JoinRoom { room_id, name } => {
            state.matchmaking.leave(session_id).await;
            state
                .rooms
                .join_room(session_id, &room_id, &display_name(name), tx.clone())
                .await
                .map_err(|err| err.to_string())
        }
        ClientMessage::QuickMatch { name, time_control } => {
            let tag = time_control.unwrap_or_else(|| TimeControl::ANY_TAG.to_string());
            state
                .matchmaking
                .join(session_id, &display_name(name), &tag, tx.clone())
                .await
                .map_err(|err| err.to_string())
        }
        ClientMessage::CancelQueue {} => {
            state.matchmaking.leave(session_id).await;
            let _ = tx.send(ServerMessage::QueueLeft {});
            Ok(())
        }
        ClientMessage::Move { san } => state
            .rooms
            .handle_move(session_id, &san)
            .await
            .map_err(|err| err.to_string()),
        ClientMessage::Resign {} => state
            .rooms
            .resign(session_id)
            .await
            .map_err(|err| err.to_string()),
        ClientMessage::DrawOffer {} => state
            .rooms
            .draw_offer(session_id)
            .await
            .map_err(|err| err.to_string()),
        ClientMessage::DrawRespond { accept } => state
            .rooms
            .draw_respond(session_id, accept)
            .await
            .map_err(|err| err.to_string()),
        ClientMessage::RematchOffer {} => state
            .rooms
            .rematch_offer(session_id)
            .await
            .map_err(|err| err.to_string()),
        ClientMessage::RematchRespond { accept } => state
            .rooms
            .rematch_respond(session_id, accept)
            .await
            .map_err(|err| err.to_string()),
        // Auth is consumed by the handshake gate before dispatch.
        ClientMessage::Auth { .. } => Ok(()),
    }
}

fn display_name(name: Option<String>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => DEFAULT_DISPLAY_NAME.to_string(),
    }
}
