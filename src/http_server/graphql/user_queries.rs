use async_graphql::{Context, Object, SimpleObject};
use chrono::{DateTime, Utc};

use crate::entities;
use crate::http_server::graphql::context::{get_app_state, require_user};
use crate::http_server::graphql::playlist_queries::timestamp;
use crate::http_server::graphql_error::GraphqlResult;
use crate::services::user::UserProfile;

#[derive(Debug, Clone, SimpleObject)]
pub struct NotificationSettings {
    pub email_notifications: bool,
    pub playlist_updates: bool,
    pub new_features: bool,
    pub marketing_emails: bool,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct UserPreferences {
    pub preferred_genres: Vec<String>,
    pub favorite_artists: Vec<String>,
    pub preferred_moods: Vec<String>,
    pub preferred_bpm_min: Option<i32>,
    pub preferred_bpm_max: Option<i32>,
    pub public_profile: bool,
    pub show_playlists: bool,
    pub allow_data_collection: bool,
    pub share_listening_history: bool,
    pub notification_settings: NotificationSettings,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub spotify_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub preferences: Option<UserPreferences>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct UserStats {
    pub playlists_created: i64,
    pub songs_added: i64,
    /// Seconds
    pub total_duration: i64,
}

pub(crate) fn map_preferences(
    model: entities::user_preferences::Model,
) -> color_eyre::Result<UserPreferences> {
    let notifications = model.notification_settings;
    Ok(UserPreferences {
        preferred_genres: model.preferred_genres.0,
        favorite_artists: model.favorite_artists.0,
        preferred_moods: model.preferred_moods.0,
        preferred_bpm_min: model.preferred_bpm_min,
        preferred_bpm_max: model.preferred_bpm_max,
        public_profile: model.public_profile,
        show_playlists: model.show_playlists,
        allow_data_collection: model.allow_data_collection,
        share_listening_history: model.share_listening_history,
        notification_settings: NotificationSettings {
            email_notifications: notifications.email_notifications,
            playlist_updates: notifications.playlist_updates,
            new_features: notifications.new_features,
            marketing_emails: notifications.marketing_emails,
        },
        updated_at: timestamp(model.updated_at)?,
    })
}

pub(crate) fn map_user(
    profile: UserProfile,
    email: Option<String>,
) -> color_eyre::Result<User> {
    Ok(User {
        id: profile.user.id,
        email,
        full_name: profile.user.full_name,
        avatar_url: profile.user.avatar_url,
        spotify_id: profile.user.spotify_id,
        created_at: timestamp(profile.user.created_at)?,
        updated_at: timestamp(profile.user.updated_at)?,
        preferences: profile.preferences.map(map_preferences).transpose()?,
    })
}

#[derive(Default)]
pub struct UserQuery;

#[Object]
impl UserQuery {
    /// The signed-in user's profile. Created on first access.
    async fn me(&self, ctx: &Context<'_>) -> GraphqlResult<User> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;

        app_state.users.ensure_user_profile(user).await?;
        let profile = app_state.users.get_user_profile(&user.id).await?;

        Ok(map_user(profile, user.email.clone())?)
    }

    async fn my_stats(&self, ctx: &Context<'_>) -> GraphqlResult<UserStats> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;

        let stats = app_state.users.get_user_stats(&user.id).await?;
        Ok(UserStats {
            playlists_created: stats.playlists_created,
            songs_added: stats.songs_added,
            total_duration: stats.total_duration,
        })
    }
}
