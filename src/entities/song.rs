use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "songs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub playlist_id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Seconds. Zero when unknown.
    pub duration: i32,
    pub year: Option<i32>,
    pub bpm: Option<i32>,
    pub key: Option<String>,
    pub spotify_id: Option<String>,
    pub youtube_id: Option<String>,
    pub preview_url: Option<String>,
    pub created_at: i64,

    #[sea_orm(belongs_to, from = "playlist_id", to = "id")]
    pub playlist: HasOne<super::playlist::Entity>,
}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        Self {
            duration: Set(0),
            created_at: Set(chrono::Utc::now().timestamp()),
            ..ActiveModelTrait::default()
        }
    }
}
