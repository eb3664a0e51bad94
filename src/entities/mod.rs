pub mod playlist;
pub mod song;
pub mod user;
pub mod user_preferences;
pub mod user_stats;
