use async_graphql::{Context, InputObject, Object};

use crate::entities::user_preferences::NotificationSettings as StoredNotificationSettings;
use crate::http_server::graphql::context::{get_app_state, require_user};
use crate::http_server::graphql::user_queries::{User, UserPreferences, map_preferences, map_user};
use crate::http_server::graphql_error::GraphqlResult;
use crate::services::user::{PreferencesUpdate, ProfileUpdate};

#[derive(Debug, Clone, InputObject)]
pub struct UpdateProfileInput {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub spotify_id: Option<String>,
}

#[derive(Debug, Clone, InputObject)]
pub struct NotificationSettingsInput {
    pub email_notifications: bool,
    pub playlist_updates: bool,
    pub new_features: bool,
    pub marketing_emails: bool,
}

#[derive(Debug, Clone, InputObject)]
pub struct UpdatePreferencesInput {
    pub preferred_genres: Option<Vec<String>>,
    pub favorite_artists: Option<Vec<String>>,
    pub preferred_moods: Option<Vec<String>>,
    pub preferred_bpm_min: Option<i32>,
    pub preferred_bpm_max: Option<i32>,
    pub public_profile: Option<bool>,
    pub show_playlists: Option<bool>,
    pub allow_data_collection: Option<bool>,
    pub share_listening_history: Option<bool>,
    pub notification_settings: Option<NotificationSettingsInput>,
}

#[derive(Default)]
pub struct UserMutation;

#[Object]
impl UserMutation {
    async fn update_profile(
        &self,
        ctx: &Context<'_>,
        input: UpdateProfileInput,
    ) -> GraphqlResult<User> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;
        app_state.users.ensure_user_profile(user).await?;

        app_state
            .users
            .update_user_profile(
                &user.id,
                ProfileUpdate {
                    full_name: input.full_name,
                    avatar_url: input.avatar_url,
                    spotify_id: input.spotify_id,
                },
            )
            .await?;
        let profile = app_state.users.get_user_profile(&user.id).await?;

        Ok(map_user(profile, user.email.clone())?)
    }

    async fn update_preferences(
        &self,
        ctx: &Context<'_>,
        input: UpdatePreferencesInput,
    ) -> GraphqlResult<UserPreferences> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;
        app_state.users.ensure_user_profile(user).await?;

        let preferences = app_state
            .users
            .update_user_preferences(
                &user.id,
                PreferencesUpdate {
                    preferred_genres: input.preferred_genres,
                    favorite_artists: input.favorite_artists,
                    preferred_moods: input.preferred_moods,
                    preferred_bpm_min: input.preferred_bpm_min,
                    preferred_bpm_max: input.preferred_bpm_max,
                    public_profile: input.public_profile,
                    show_playlists: input.show_playlists,
                    allow_data_collection: input.allow_data_collection,
                    share_listening_history: input.share_listening_history,
                    notification_settings: input.notification_settings.map(|n| {
                        StoredNotificationSettings {
                            email_notifications: n.email_notifications,
                            playlist_updates: n.playlist_updates,
                            new_features: n.new_features,
                            marketing_emails: n.marketing_emails,
                        }
                    }),
                },
            )
            .await?;

        Ok(map_preferences(preferences)?)
    }

    /// Deletes the caller's profile, preferences and playlists.
    async fn delete_account(&self, ctx: &Context<'_>) -> GraphqlResult<bool> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;

        app_state.users.delete_account(&user.id).await?;
        Ok(true)
    }
}
