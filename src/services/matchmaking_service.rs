use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::models::message::ServerMessage;
use crate::models::time_control::TimeControl;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;
use crate::services::room_service::{MatchedPlayer, RoomService};

struct QueueEntry {
    session_id: String,
    name: String,
    sender: UnboundedSender<ServerMessage>,
}

/// FIFO matchmaking queues, one per time-control tag plus the `"any"`
/// wildcard. A session is in at most one queue, and never in a queue while
/// seated in a room.
///
/// Pairing is atomic: the queue lock is held from the moment an opponent is
/// popped until both `game_start` frames are queued.
pub struct MatchmakingService {
    config: Arc<ServerConfig>,
    rooms: Arc<RoomService>,
    /// BTreeMap so the wildcard scan order is deterministic.
    queues: Mutex<BTreeMap<String, VecDeque<QueueEntry>>>,
}

impl MatchmakingService {
    pub fn new(config: Arc<ServerConfig>, rooms: Arc<RoomService>) -> Self {
        MatchmakingService {
            config,
            rooms,
            queues: Mutex::new(BTreeMap::new()),
        }
    }

    /// `quick_match`: pair immediately when a compatible opponent is
    /// waiting, otherwise enqueue under `tag`.
    pub async fn join(
        &self,
        session_id: &str,
        name: &str,
        tag: &str,
        sender: UnboundedSender<ServerMessage>,
    ) -> Result<(), MatchmakingServiceError> {
        if !TimeControl::is_valid_tag(tag) {
            return Err(MatchmakingServiceError::ValidationError(format!(
                "Invalid time control: {}",
                tag
            )));
        }

        let mut queues = self.queues.lock().await;
        let queued = queues
            .values()
            .any(|queue| queue.iter().any(|entry| entry.session_id == session_id));
        if queued {
            return Err(MatchmakingServiceError::AlreadyInQueue);
        }
        if self.rooms.is_seated(session_id).await {
            return Err(MatchmakingServiceError::AlreadyInGame);
        }

        let Some((opponent, effective_tag)) =
            pop_opponent(&mut queues, tag, &self.config.default_time_control)
        else {
            let queue = queues.entry(tag.to_string()).or_default();
            queue.push_back(QueueEntry {
                session_id: session_id.to_string(),
                name: name.to_string(),
                sender: sender.clone(),
            });
            let position = queue.len();
            info!(session_id, tag, position, "Queued for matchmaking");
            let _ = sender.send(ServerMessage::QueueJoined {
                time_control: tag.to_string(),
                position,
            });
            return Ok(());
        };

        info!(
            session_id,
            opponent = %opponent.session_id,
            time_control = %effective_tag,
            "Matched players"
        );
        let caller = MatchedPlayer {
            session_id: session_id.to_string(),
            name: name.to_string(),
            sender,
        };
        let opponent = MatchedPlayer {
            session_id: opponent.session_id,
            name: opponent.name,
            sender: opponent.sender,
        };
        let (white, black) = if rand::thread_rng().gen_bool(0.5) {
            (caller, opponent)
        } else {
            (opponent, caller)
        };
        if let Err(err) = self.rooms.create_matched(white, black, &effective_tag).await {
            error!(error = %err, "Failed to start matched game");
            return Err(MatchmakingServiceError::ValidationError(
                "Failed to start match".to_string(),
            ));
        }
        Ok(())
    }

    /// `cancel_queue` and the disconnect hook. Returns whether the session
    /// was queued.
    pub async fn leave(&self, session_id: &str) -> bool {
        let mut queues = self.queues.lock().await;
        let mut removed = false;
        queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|entry| entry.session_id != session_id);
            removed |= queue.len() != before;
            !queue.is_empty()
        });
        removed
    }

    pub async fn handle_disconnect(&self, session_id: &str) {
        if self.leave(session_id).await {
            debug!(session_id, "Dropped disconnected session from queue");
        }
    }
}

/// The pairing policy. A specific tag prefers its own queue and falls back
/// to the wildcard queue; the wildcard scans all queues in tag order. When
/// a specific player meets a wildcard player the specific tag wins; two
/// wildcards play the default control.
fn pop_opponent(
    queues: &mut BTreeMap<String, VecDeque<QueueEntry>>,
    tag: &str,
    default_tag: &str,
) -> Option<(QueueEntry, String)> {
    if tag == TimeControl::ANY_TAG {
        let keys: Vec<String> = queues.keys().cloned().collect();
        for key in keys {
            if let Some(entry) = pop_live(queues, &key) {
                let effective = if key == TimeControl::ANY_TAG {
                    default_tag.to_string()
                } else {
                    key
                };
                return Some((entry, effective));
            }
        }
        None
    } else {
        for key in [tag, TimeControl::ANY_TAG] {
            if let Some(entry) = pop_live(queues, key) {
                return Some((entry, tag.to_string()));
            }
        }
        None
    }
}

/// Pop the queue head, discarding entries whose connection died while they
/// waited.
fn pop_live(
    queues: &mut BTreeMap<String, VecDeque<QueueEntry>>,
    key: &str,
) -> Option<QueueEntry> {
    let queue = queues.get_mut(key)?;
    let mut found = None;
    while let Some(entry) = queue.pop_front() {
        if entry.sender.is_closed() {
            debug!(session_id = %entry.session_id, "Discarding dead queue entry");
            continue;
        }
        found = Some(entry);
        break;
    }
    if queue.is_empty() {
        queues.remove(key);
    }
    found
}
