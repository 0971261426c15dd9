#[derive(Debug)]
pub enum MatchmakingServiceError {
    AlreadyInQueue,
    AlreadyInGame,
    ValidationError(String),
}

impl std::fmt::Display for MatchmakingServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchmakingServiceError::AlreadyInQueue => write!(f, "Already in queue"),
            MatchmakingServiceError::AlreadyInGame => write!(f, "Already in a game"),
            MatchmakingServiceError::ValidationError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MatchmakingServiceError {}
