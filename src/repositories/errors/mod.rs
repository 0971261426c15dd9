pub mod game_archive_errors;
