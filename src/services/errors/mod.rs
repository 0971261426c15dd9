pub mod chess_service_errors;
pub mod matchmaking_service_errors;
pub mod room_service_errors;
