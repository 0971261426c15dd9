#[derive(Debug)]
pub enum GameArchiveError {
    GameNotFound(String),
    StorageError(String),
}

impl std::fmt::Display for GameArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameArchiveError::GameNotFound(id) => write!(f, "Game not found: {}", id),
            GameArchiveError::StorageError(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for GameArchiveError {}
