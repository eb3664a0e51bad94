pub mod generator;
pub mod playlist;
pub mod session;
pub mod user;
