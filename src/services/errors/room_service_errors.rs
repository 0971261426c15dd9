use crate::repositories::errors::game_archive_errors::GameArchiveError;

/// Domain errors surfaced to clients as `error` frames. The `Display`
/// strings are the wire messages.
#[derive(Debug)]
pub enum RoomServiceError {
    RoomNotFound,
    RoomNotAccepting,
    AlreadyInRoom,
    NotPlayerInRoom,
    NotInRoom,
    GameNotInProgress,
    GameNotFinished,
    NotYourTurn,
    InvalidMove,
    AlreadyInGame,
    NoDrawOffer,
    NoRematchOffer,
    ValidationError(String),
    ArchiveError(GameArchiveError),
}

impl std::fmt::Display for RoomServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomServiceError::RoomNotFound => write!(f, "Room not found"),
            RoomServiceError::RoomNotAccepting => write!(f, "Room is not accepting players"),
            RoomServiceError::AlreadyInRoom => write!(f, "You are already in this room"),
            RoomServiceError::NotPlayerInRoom => write!(f, "You are not a player in this room"),
            RoomServiceError::NotInRoom => write!(f, "Not in a room"),
            RoomServiceError::GameNotInProgress => write!(f, "Game not in progress"),
            RoomServiceError::GameNotFinished => write!(f, "Game is not finished"),
            RoomServiceError::NotYourTurn => write!(f, "Not your turn"),
            RoomServiceError::InvalidMove => write!(f, "Invalid move"),
            RoomServiceError::AlreadyInGame => write!(f, "Already in a game"),
            RoomServiceError::NoDrawOffer => write!(f, "No draw offer to respond to"),
            RoomServiceError::NoRematchOffer => write!(f, "No rematch offer to respond to"),
            RoomServiceError::ValidationError(msg) => write!(f, "{}", msg),
            RoomServiceError::ArchiveError(err) => write!(f, "Archive error: {}", err),
        }
    }
}

impl std::error::Error for RoomServiceError {}

impl From<GameArchiveError> for RoomServiceError {
    fn from(err: GameArchiveError) -> Self {
        RoomServiceError::ArchiveError(err)
    }
}
