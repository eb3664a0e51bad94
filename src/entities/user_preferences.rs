use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringVec(pub Vec<String>);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct NotificationSettings {
    pub email_notifications: bool,
    pub playlist_updates: bool,
    pub new_features: bool,
    pub marketing_emails: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_notifications: true,
            playlist_updates: true,
            new_features: true,
            marketing_emails: false,
        }
    }
}

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "user_preferences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub preferred_genres: StringVec,
    pub favorite_artists: StringVec,
    pub preferred_moods: StringVec,
    pub preferred_bpm_min: Option<i32>,
    pub preferred_bpm_max: Option<i32>,
    pub public_profile: bool,
    pub show_playlists: bool,
    pub allow_data_collection: bool,
    pub share_listening_history: bool,
    pub notification_settings: NotificationSettings,
    pub created_at: i64,
    pub updated_at: i64,

    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            preferred_genres: Set(StringVec::default()),
            favorite_artists: Set(StringVec::default()),
            preferred_moods: Set(StringVec::default()),
            preferred_bpm_min: Set(None),
            preferred_bpm_max: Set(None),
            public_profile: Set(false),
            show_playlists: Set(true),
            allow_data_collection: Set(true),
            share_listening_history: Set(false),
            notification_settings: Set(NotificationSettings::default()),
            created_at: Set(now),
            updated_at: Set(now),
            ..ActiveModelTrait::default()
        }
    }

    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, sea_orm::DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            self.updated_at = Set(chrono::Utc::now().timestamp());
        }
        Ok(self)
    }
}
