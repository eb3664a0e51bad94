use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, DbErr, EntityTrait, Set};

use crate::auth_rs::AuthUser;
use crate::config::ProfileSyncConfig;
use crate::database::Database;
use crate::entities;
use crate::entities::user_preferences::{NotificationSettings, StringVec};
use crate::error::{PlaylistError, is_unique_violation, map_db_err};

/// Profile creation retry policy.
#[derive(Debug, Clone, Copy)]
pub struct ProfileRetry {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for ProfileRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl From<&ProfileSyncConfig> for ProfileRetry {
    fn from(config: &ProfileSyncConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: entities::user::Model,
    pub preferences: Option<entities::user_preferences::Model>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub spotify_id: Option<String>,
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct PreferencesUpdate {
    pub preferred_genres: Option<Vec<String>>,
    pub favorite_artists: Option<Vec<String>>,
    pub preferred_moods: Option<Vec<String>>,
    pub preferred_bpm_min: Option<i32>,
    pub preferred_bpm_max: Option<i32>,
    pub public_profile: Option<bool>,
    pub show_playlists: Option<bool>,
    pub allow_data_collection: Option<bool>,
    pub share_listening_history: Option<bool>,
    pub notification_settings: Option<NotificationSettings>,
}

pub struct UserService {
    db: Arc<Database>,
    retry: ProfileRetry,
}

impl UserService {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_retry(db, ProfileRetry::default())
    }

    pub fn with_retry(db: Arc<Database>, retry: ProfileRetry) -> Self {
        Self { db, retry }
    }

    /// Make sure a profile row exists for an authenticated identity.
    ///
    /// Safe to call on every sign-in and from concurrent tasks: a unique violation means
    /// someone else created the row first, which counts as success. Preferences are
    /// created best-effort and never block the profile.
    pub async fn ensure_user_profile(
        &self,
        auth_user: &AuthUser,
    ) -> Result<entities::user::Model, PlaylistError> {
        if let Some(existing) = self.find_user(&auth_user.id).await? {
            return Ok(existing);
        }

        log::info!("Creating profile for user {}", auth_user.id);

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.base_delay)
            .with_max_times(self.retry.max_attempts.saturating_sub(1));

        (|| async { self.upsert_profile(auth_user).await })
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .notify(|err: &DbErr, dur: Duration| {
                log::warn!(
                    "Retrying profile creation for user {} in {:?}: {}",
                    auth_user.id,
                    dur,
                    err
                );
            })
            .await
            .map_err(|e| map_db_err(e, "Failed to create user profile"))?;

        if let Err(e) = self.create_default_preferences(&auth_user.id).await {
            log::warn!(
                "Failed to create preferences for user {}: {}",
                auth_user.id,
                e
            );
        }

        self.find_user(&auth_user.id)
            .await?
            .ok_or_else(|| PlaylistError::NotFound("User profile".to_string()))
    }

    /// Insert the profile row. Fails if it already exists.
    pub async fn create_profile(
        &self,
        auth_user: &AuthUser,
    ) -> Result<entities::user::Model, PlaylistError> {
        profile_row(auth_user)
            .insert(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to create user profile"))
    }

    /// Insert default preferences unless a row already exists.
    pub async fn create_default_preferences(&self, user_id: &str) -> Result<(), PlaylistError> {
        let preferences = entities::user_preferences::ActiveModel {
            user_id: Set(user_id.to_string()),
            ..entities::user_preferences::ActiveModel::new()
        };

        entities::user_preferences::Entity::insert(preferences)
            .on_conflict(
                OnConflict::column(entities::user_preferences::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to create user preferences"))?;
        Ok(())
    }

    pub async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile, PlaylistError> {
        let user = self
            .find_user(user_id)
            .await?
            .ok_or_else(|| PlaylistError::NotFound("User profile".to_string()))?;
        let preferences = entities::user_preferences::Entity::find_by_id(user_id.to_string())
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get user preferences"))?;

        Ok(UserProfile { user, preferences })
    }

    pub async fn update_user_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<entities::user::Model, PlaylistError> {
        let user = self
            .find_user(user_id)
            .await?
            .ok_or_else(|| PlaylistError::NotFound("User profile".to_string()))?;

        let mut active: entities::user::ActiveModel = user.into();
        if let Some(full_name) = update.full_name {
            active.full_name = Set(Some(full_name));
        }
        if let Some(avatar_url) = update.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }
        if let Some(spotify_id) = update.spotify_id {
            active.spotify_id = Set(Some(spotify_id));
        }

        active
            .update(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to update user profile"))
    }

    /// Creates the preferences row first if it went missing.
    pub async fn update_user_preferences(
        &self,
        user_id: &str,
        update: PreferencesUpdate,
    ) -> Result<entities::user_preferences::Model, PlaylistError> {
        if let (Some(min), Some(max)) = (update.preferred_bpm_min, update.preferred_bpm_max)
            && min > max
        {
            return Err(PlaylistError::InvalidInput(
                "Minimum BPM must not exceed maximum BPM".to_string(),
            ));
        }

        self.create_default_preferences(user_id).await?;

        let preferences = entities::user_preferences::Entity::find_by_id(user_id.to_string())
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get user preferences"))?
            .ok_or_else(|| PlaylistError::NotFound("User preferences".to_string()))?;

        let mut active: entities::user_preferences::ActiveModel = preferences.into();
        if let Some(genres) = update.preferred_genres {
            active.preferred_genres = Set(StringVec(genres));
        }
        if let Some(artists) = update.favorite_artists {
            active.favorite_artists = Set(StringVec(artists));
        }
        if let Some(moods) = update.preferred_moods {
            active.preferred_moods = Set(StringVec(moods));
        }
        if let Some(min) = update.preferred_bpm_min {
            active.preferred_bpm_min = Set(Some(min));
        }
        if let Some(max) = update.preferred_bpm_max {
            active.preferred_bpm_max = Set(Some(max));
        }
        if let Some(value) = update.public_profile {
            active.public_profile = Set(value);
        }
        if let Some(value) = update.show_playlists {
            active.show_playlists = Set(value);
        }
        if let Some(value) = update.allow_data_collection {
            active.allow_data_collection = Set(value);
        }
        if let Some(value) = update.share_listening_history {
            active.share_listening_history = Set(value);
        }
        if let Some(settings) = update.notification_settings {
            active.notification_settings = Set(settings);
        }

        active
            .update(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to update user preferences"))
    }

    /// Zeroed stats when the user has never created a playlist.
    pub async fn get_user_stats(
        &self,
        user_id: &str,
    ) -> Result<entities::user_stats::Model, PlaylistError> {
        let stats = entities::user_stats::Entity::find_by_id(user_id.to_string())
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get user stats"))?;

        Ok(stats.unwrap_or_else(|| entities::user_stats::Model {
            user_id: user_id.to_string(),
            playlists_created: 0,
            songs_added: 0,
            total_duration: 0,
            updated_at: chrono::Utc::now().timestamp(),
        }))
    }

    /// Removes the profile and everything hanging off it.
    pub async fn delete_account(&self, user_id: &str) -> Result<(), PlaylistError> {
        let result = entities::user::Entity::delete_by_id(user_id.to_string())
            .exec(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to delete account"))?;

        if result.rows_affected == 0 {
            return Err(PlaylistError::NotFound("User profile".to_string()));
        }
        log::info!("Deleted account {user_id}");
        Ok(())
    }

    async fn find_user(
        &self,
        user_id: &str,
    ) -> Result<Option<entities::user::Model>, PlaylistError> {
        entities::user::Entity::find_by_id(user_id.to_string())
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get user profile"))
    }

    async fn upsert_profile(&self, auth_user: &AuthUser) -> Result<(), DbErr> {
        let result = entities::user::Entity::insert(profile_row(auth_user))
            .on_conflict(
                OnConflict::column(entities::user::Column::Id)
                    .update_columns([
                        entities::user::Column::FullName,
                        entities::user::Column::AvatarUrl,
                        entities::user::Column::SpotifyId,
                        entities::user::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db.conn)
            .await;

        match result {
            Err(err) if is_unique_violation(&err) => Ok(()),
            Err(err) => Err(err),
            Ok(_) => Ok(()),
        }
    }
}

fn profile_row(auth_user: &AuthUser) -> entities::user::ActiveModel {
    let metadata = &auth_user.user_metadata;
    entities::user::ActiveModel {
        id: Set(auth_user.id.clone()),
        full_name: Set(metadata.full_name.clone()),
        avatar_url: Set(metadata.avatar_url.clone()),
        spotify_id: Set(metadata.spotify_id.clone()),
        ..entities::user::ActiveModel::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::playlist::{NewPlaylist, PlaylistService};
    use crate::test_utils::{auth_user, test_db};
    use sea_orm::PaginatorTrait;

    fn fast_retry() -> ProfileRetry {
        ProfileRetry {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_ensure_user_profile_creates_profile_and_preferences() {
        let db = test_db().await;
        let service = UserService::with_retry(db.clone(), fast_retry());

        let user = service.ensure_user_profile(&auth_user("u1")).await.unwrap();
        assert_eq!(user.full_name.as_deref(), Some("User u1"));

        let profile = service.get_user_profile("u1").await.unwrap();
        let preferences = profile.preferences.unwrap();
        assert!(preferences.show_playlists);
        assert!(!preferences.public_profile);
        assert!(!preferences.notification_settings.marketing_emails);
    }

    #[tokio::test]
    async fn test_ensure_user_profile_is_idempotent() {
        let db = test_db().await;
        let service = UserService::with_retry(db.clone(), fast_retry());

        let first = service.ensure_user_profile(&auth_user("u1")).await.unwrap();
        let second = service.ensure_user_profile(&auth_user("u1")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(entities::user::Entity::find().count(&db.conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_user_profile_leaves_one_row() {
        let db = test_db().await;
        let service = UserService::with_retry(db.clone(), fast_retry());
        let user = auth_user("u1");

        let (a, b) = tokio::join!(
            service.ensure_user_profile(&user),
            service.ensure_user_profile(&user)
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(entities::user::Entity::find().count(&db.conn).await.unwrap(), 1);
        assert_eq!(
            entities::user_preferences::Entity::find()
                .count(&db.conn)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_create_profile_twice_is_constraint_violation() {
        let db = test_db().await;
        let service = UserService::new(db);

        service.create_profile(&auth_user("u1")).await.unwrap();
        let err = service.create_profile(&auth_user("u1")).await.unwrap_err();

        assert!(matches!(err, PlaylistError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_update_user_preferences_partial() {
        let db = test_db().await;
        let service = UserService::with_retry(db, fast_retry());
        service.ensure_user_profile(&auth_user("u1")).await.unwrap();

        let updated = service
            .update_user_preferences(
                "u1",
                PreferencesUpdate {
                    preferred_genres: Some(vec!["trip-hop".to_string()]),
                    preferred_bpm_min: Some(80),
                    preferred_bpm_max: Some(110),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.preferred_genres.0, vec!["trip-hop".to_string()]);
        assert_eq!(updated.preferred_bpm_min, Some(80));
        assert!(updated.favorite_artists.0.is_empty());
        assert!(updated.allow_data_collection);
    }

    #[tokio::test]
    async fn test_update_user_preferences_rejects_inverted_bpm() {
        let db = test_db().await;
        let service = UserService::with_retry(db, fast_retry());
        service.ensure_user_profile(&auth_user("u1")).await.unwrap();

        let err = service
            .update_user_preferences(
                "u1",
                PreferencesUpdate {
                    preferred_bpm_min: Some(140),
                    preferred_bpm_max: Some(90),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PlaylistError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_user_profile() {
        let db = test_db().await;
        let service = UserService::with_retry(db, fast_retry());
        service.ensure_user_profile(&auth_user("u1")).await.unwrap();

        let updated = service
            .update_user_profile(
                "u1",
                ProfileUpdate {
                    full_name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.full_name.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_delete_account_cascades() {
        let db = test_db().await;
        let users = UserService::with_retry(db.clone(), fast_retry());
        let playlists = PlaylistService::new(db.clone());
        users.ensure_user_profile(&auth_user("u1")).await.unwrap();
        playlists
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();

        users.delete_account("u1").await.unwrap();

        assert_eq!(
            entities::playlist::Entity::find().count(&db.conn).await.unwrap(),
            0
        );
        assert_eq!(
            entities::user_preferences::Entity::find()
                .count(&db.conn)
                .await
                .unwrap(),
            0
        );
        assert!(matches!(
            users.delete_account("u1").await,
            Err(PlaylistError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_user_stats_defaults_to_zero() {
        let db = test_db().await;
        let service = UserService::new(db);

        let stats = service.get_user_stats("nobody").await.unwrap();
        assert_eq!(stats.playlists_created, 0);
        assert_eq!(stats.total_duration, 0);
    }
}
