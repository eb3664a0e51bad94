use std::sync::Arc;

use sea_orm::{ActiveModelBehavior, ActiveModelTrait, Set};

use crate::auth_rs::{AuthUser, UserMetadata};
use crate::database::Database;
use crate::entities;

pub async fn test_db() -> Arc<Database> {
    Arc::new(Database::in_memory().await.unwrap())
}

pub fn auth_user(id: &str) -> AuthUser {
    AuthUser {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
        user_metadata: UserMetadata {
            full_name: Some(format!("User {id}")),
            avatar_url: None,
            spotify_id: None,
        },
    }
}

/// Insert a bare profile row so playlists can reference it.
pub async fn seed_user(db: &Database, id: &str) {
    entities::user::ActiveModel {
        id: Set(id.to_string()),
        full_name: Set(Some(format!("User {id}"))),
        ..entities::user::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap();
}

/// App state backed by an in-memory database. Outbound clients point at a closed port.
pub async fn test_app_state() -> Arc<crate::http_server::state::AppState> {
    let mut config = crate::config::Config::default();
    config.auth.url = Some("http://127.0.0.1:9".to_string());
    config.auth.anon_key = Some("anon".to_string());
    config.completion.base_url = "http://127.0.0.1:9".to_string();
    config.completion.api_key = Some("test".to_string());

    crate::http_server::app::build_state(test_db().await, config).unwrap()
}
