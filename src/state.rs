use std::sync::Arc;

use crate::config::ServerConfig;
use crate::repositories::game_archive::{GameArchive, InMemoryGameArchive};
use crate::services::matchmaking_service::MatchmakingService;
use crate::services::room_service::RoomService;
use crate::services::session_service::SessionService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<SessionService>,
    pub rooms: Arc<RoomService>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        AppState::with_archive(config, Arc::new(InMemoryGameArchive::new()))
    }

    pub fn with_archive(config: Arc<ServerConfig>, archive: Arc<dyn GameArchive>) -> Self {
        let rooms = RoomService::new(config.clone(), archive);
        let matchmaking = Arc::new(MatchmakingService::new(config.clone(), rooms.clone()));
        AppState {
            config,
            sessions: Arc::new(SessionService::new()),
            rooms,
            matchmaking,
        }
    }
}
