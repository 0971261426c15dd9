pub mod chess_service;
pub mod errors;
pub mod matchmaking_service;
pub mod room_service;
pub mod session_service;
pub mod timer_service;
