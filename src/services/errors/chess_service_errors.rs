#[derive(Debug)]
pub enum ChessServiceError {
    InvalidMove(String),
    GameOver,
}

impl std::fmt::Display for ChessServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChessServiceError::InvalidMove(san) => write!(f, "Invalid move: {}", san),
            ChessServiceError::GameOver => write!(f, "Game is already over"),
        }
    }
}

impl std::error::Error for ChessServiceError {}
