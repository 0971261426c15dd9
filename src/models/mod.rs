pub mod game_record;
pub mod message;
pub mod room;
pub mod time_control;
