use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Health check endpoint to verify server status
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, String) {
    let rooms = state.rooms.room_count().await;
    (StatusCode::OK, format!("Healthy! ({} live rooms)", rooms))
}
