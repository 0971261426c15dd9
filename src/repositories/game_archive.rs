use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::game_record::{GameEndReason, GameMeta, GameRecord, GameResult, MoveRecord};
use crate::repositories::errors::game_archive_errors::GameArchiveError;

/// Durable store for completed and in-flight games.
///
/// `append_move` is idempotent on `(game id, ply)`: the store keeps the
/// first write and treats retries as success. The live room is the
/// authority; nothing here ever feeds back into game state.
#[async_trait]
pub trait GameArchive: Send + Sync {
    async fn create_game(&self, meta: &GameMeta) -> Result<String, GameArchiveError>;

    async fn append_move(
        &self,
        game_id: &str,
        move_record: &MoveRecord,
    ) -> Result<(), GameArchiveError>;

    async fn finish_game(
        &self,
        game_id: &str,
        result: GameResult,
        reason: GameEndReason,
    ) -> Result<(), GameArchiveError>;

    async fn get_game(&self, game_id: &str) -> Result<Option<GameRecord>, GameArchiveError>;
}

/// Process-local archive. A durable backend would implement the same trait
/// with the same idempotency contract.
#[derive(Default)]
pub struct InMemoryGameArchive {
    games: Mutex<HashMap<String, GameRecord>>,
}

impl InMemoryGameArchive {
    pub fn new() -> Self {
        InMemoryGameArchive::default()
    }
}

#[async_trait]
impl GameArchive for InMemoryGameArchive {
    async fn create_game(&self, meta: &GameMeta) -> Result<String, GameArchiveError> {
        let id = Uuid::new_v4().to_string();
        let record = GameRecord {
            id: id.clone(),
            meta: meta.clone(),
            moves: BTreeMap::new(),
            result: None,
            reason: None,
            created_at: Utc::now().timestamp_millis(),
            ended_at: None,
        };
        self.games.lock().unwrap().insert(id.clone(), record);
        info!(game_id = %id, time_control = %meta.time_control, "Created game record");
        Ok(id)
    }

    async fn append_move(
        &self,
        game_id: &str,
        move_record: &MoveRecord,
    ) -> Result<(), GameArchiveError> {
        let mut games = self.games.lock().unwrap();
        let record = games
            .get_mut(game_id)
            .ok_or_else(|| GameArchiveError::GameNotFound(game_id.to_string()))?;
        match record.moves.entry(move_record.ply) {
            Entry::Vacant(entry) => {
                entry.insert(move_record.clone());
            }
            Entry::Occupied(_) => {
                debug!(game_id, ply = move_record.ply, "Duplicate move append ignored");
            }
        }
        Ok(())
    }

    async fn finish_game(
        &self,
        game_id: &str,
        result: GameResult,
        reason: GameEndReason,
    ) -> Result<(), GameArchiveError> {
        let mut games = self.games.lock().unwrap();
        let record = games
            .get_mut(game_id)
            .ok_or_else(|| GameArchiveError::GameNotFound(game_id.to_string()))?;
        if record.result.is_some() {
            debug!(game_id, "Game already finalized, ignoring");
            return Ok(());
        }
        record.result = Some(result);
        record.reason = Some(reason);
        record.ended_at = Some(Utc::now().timestamp_millis());
        info!(game_id, result = %result, reason = %reason, "Finalized game record");
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> Result<Option<GameRecord>, GameArchiveError> {
        Ok(self.games.lock().unwrap().get(game_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::room::PlayerColor;

    fn meta() -> GameMeta {
        GameMeta::multiplayer(
            "5+0",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "Alice",
            "Bob",
        )
    }

    fn move_record(ply: u32, san: &str) -> MoveRecord {
        MoveRecord {
            ply,
            san: san.to_string(),
            fen: "fen".to_string(),
            timestamp: 1_000,
            side: PlayerColor::White,
        }
    }

    #[tokio::test]
    async fn test_append_move_is_idempotent_on_ply() {
        let archive = InMemoryGameArchive::new();
        let id = archive.create_game(&meta()).await.unwrap();

        let first = move_record(0, "e4");
        archive.append_move(&id, &first).await.unwrap();
        archive.append_move(&id, &first).await.unwrap();
        archive
            .append_move(&id, &move_record(0, "d4"))
            .await
            .unwrap();

        let record = archive.get_game(&id).await.unwrap().unwrap();
        assert_eq!(record.moves.len(), 1);
        assert_eq!(record.moves[&0].san, "e4");
    }

    #[tokio::test]
    async fn test_finish_game_keeps_first_result() {
        let archive = InMemoryGameArchive::new();
        let id = archive.create_game(&meta()).await.unwrap();

        archive
            .finish_game(&id, GameResult::WhiteWins, GameEndReason::Checkmate)
            .await
            .unwrap();
        archive
            .finish_game(&id, GameResult::Draw, GameEndReason::Agreement)
            .await
            .unwrap();

        let record = archive.get_game(&id).await.unwrap().unwrap();
        assert_eq!(record.result, Some(GameResult::WhiteWins));
        assert_eq!(record.reason, Some(GameEndReason::Checkmate));
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_append_to_unknown_game_fails() {
        let archive = InMemoryGameArchive::new();
        let result = archive.append_move("missing", &move_record(0, "e4")).await;
        assert!(matches!(result, Err(GameArchiveError::GameNotFound(_))));
    }
}
