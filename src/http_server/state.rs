use std::sync::Arc;

use crate::database::Database;
use crate::services::generator::PlaylistGenerator;
use crate::services::generator::client::GroqHttpAdapter;
use crate::services::playlist::PlaylistService;
use crate::services::session::client::AuthHttpAdapter;
use crate::services::user::UserService;

pub struct AppState {
    pub db: Arc<Database>,
    /// Browser origin allowed to call the API in release builds.
    pub allowed_origin: String,
    /// Verifies bearer tokens sent by clients.
    pub auth: AuthHttpAdapter,
    pub playlists: Arc<PlaylistService>,
    pub users: Arc<UserService>,
    pub generator: PlaylistGenerator<GroqHttpAdapter>,
}
