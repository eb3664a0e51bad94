use std::sync::Arc;

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionError,
    TransactionTrait,
};

use crate::database::Database;
use crate::entities;
use crate::error::{PlaylistError, map_db_err};

pub const MAX_SONG_FIELD_LENGTH: usize = 200;

/// Fields accepted when creating a playlist. Missing fields fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct NewPlaylist {
    pub name: Option<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub mood: Option<String>,
    pub is_public: Option<bool>,
    pub cover_url: Option<String>,
    pub spotify_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Seconds
    pub duration: Option<i32>,
    pub year: Option<i32>,
    pub bpm: Option<i32>,
    pub key: Option<String>,
    pub spotify_id: Option<String>,
    pub youtube_id: Option<String>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaylistWithSongs {
    pub playlist: entities::playlist::Model,
    pub songs: Vec<entities::song::Model>,
}

pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: usize,
    pub page_size: usize,
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| truncate_chars(v.trim(), MAX_SONG_FIELD_LENGTH))
        .filter(|v| !v.is_empty())
}

fn flatten_transaction_error(err: TransactionError<DbErr>) -> DbErr {
    match err {
        TransactionError::Connection(err) | TransactionError::Transaction(err) => err,
    }
}

pub struct PlaylistService {
    db: Arc<Database>,
}

impl PlaylistService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create_playlist(
        &self,
        owner_user_id: &str,
        fields: NewPlaylist,
    ) -> Result<entities::playlist::Model, PlaylistError> {
        let playlist = entities::playlist::ActiveModel {
            user_id: Set(owner_user_id.to_string()),
            name: Set(fields
                .name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Untitled Playlist".to_string())),
            description: Set(fields.description),
            prompt: Set(fields.prompt),
            mood: Set(fields.mood),
            is_public: Set(fields.is_public.unwrap_or(false)),
            cover_url: Set(fields.cover_url),
            spotify_id: Set(fields.spotify_id),
            ..entities::playlist::ActiveModel::new()
        };

        let model = playlist
            .insert(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to create playlist"))?;

        if let Err(e) = refresh_user_stats(&self.db.conn, owner_user_id).await {
            log::warn!("Failed to refresh stats for user {owner_user_id}: {e}");
        }

        log::info!("Playlist created: '{}' (ID: {})", model.name, model.id);
        Ok(model)
    }

    /// A playlist is visible to its owner, and to everyone once public.
    pub async fn get_playlist(
        &self,
        viewer_user_id: Option<&str>,
        playlist_id: i64,
    ) -> Result<PlaylistWithSongs, PlaylistError> {
        let playlist = entities::playlist::Entity::find_by_id(playlist_id)
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get playlist"))?
            .filter(|p| p.is_public || viewer_user_id == Some(p.user_id.as_str()))
            .ok_or_else(|| PlaylistError::NotFound("Playlist".to_string()))?;

        let songs = self.songs_for(playlist.id).await?;
        Ok(PlaylistWithSongs { playlist, songs })
    }

    /// The playlist, if `user_id` owns it.
    pub async fn require_owner(
        &self,
        user_id: &str,
        playlist_id: i64,
    ) -> Result<entities::playlist::Model, PlaylistError> {
        entities::playlist::Entity::find_by_id(playlist_id)
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get playlist"))?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| PlaylistError::NotFound("Playlist".to_string()))
    }

    /// Newest first.
    pub async fn list_user_playlists(
        &self,
        user_id: &str,
        page: Option<i32>,
        page_size: Option<i32>,
    ) -> Result<PaginatedResult<PlaylistWithSongs>, PlaylistError> {
        let page = page.unwrap_or(1).max(1) as usize;
        let page_size = page_size.unwrap_or(25).clamp(1, 100) as usize;

        let query = entities::playlist::Entity::find()
            .filter(entities::playlist::Column::UserId.eq(user_id));

        let total_count = query
            .clone()
            .count(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to count playlists"))?;

        let offset = page.saturating_sub(1) * page_size;
        let playlists = query
            .order_by_desc(entities::playlist::Column::CreatedAt)
            .order_by_desc(entities::playlist::Column::Id)
            .limit(page_size as u64)
            .offset(offset as u64)
            .all(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to list playlists"))?;

        let mut items = Vec::with_capacity(playlists.len());
        for playlist in playlists {
            let songs = self.songs_for(playlist.id).await?;
            items.push(PlaylistWithSongs { playlist, songs });
        }

        Ok(PaginatedResult {
            items,
            total_count,
            page,
            page_size,
        })
    }

    /// Insert a song and recompute the playlist's aggregates in the same transaction.
    pub async fn add_song(
        &self,
        playlist_id: i64,
        song: NewSong,
    ) -> Result<entities::song::Model, PlaylistError> {
        let title = truncate_chars(song.title.trim(), MAX_SONG_FIELD_LENGTH);
        let artist = truncate_chars(song.artist.trim(), MAX_SONG_FIELD_LENGTH);
        if title.is_empty() || artist.is_empty() {
            return Err(PlaylistError::InvalidInput(
                "Song title and artist are required".to_string(),
            ));
        }

        let row = entities::song::ActiveModel {
            playlist_id: Set(playlist_id),
            title: Set(title),
            artist: Set(artist),
            album: Set(clean_optional(song.album)),
            duration: Set(song.duration.unwrap_or(0).max(0)),
            year: Set(song.year),
            bpm: Set(song.bpm),
            key: Set(clean_optional(song.key)),
            spotify_id: Set(song.spotify_id),
            youtube_id: Set(song.youtube_id),
            preview_url: Set(song.preview_url),
            ..entities::song::ActiveModel::new()
        };

        self.db
            .conn
            .transaction::<_, entities::song::Model, DbErr>(|txn| {
                Box::pin(async move {
                    let model = row.insert(txn).await?;
                    recompute_playlist_metrics(txn, playlist_id).await?;
                    Ok(model)
                })
            })
            .await
            .map_err(|e| map_db_err(flatten_transaction_error(e), "Failed to add song to playlist"))
    }

    /// Delete by (playlist, song) and recompute the playlist's aggregates.
    pub async fn remove_song(&self, playlist_id: i64, song_id: i64) -> Result<(), PlaylistError> {
        let removed = self
            .db
            .conn
            .transaction::<_, u64, DbErr>(|txn| {
                Box::pin(async move {
                    let result = entities::song::Entity::delete_many()
                        .filter(
                            Condition::all()
                                .add(entities::song::Column::Id.eq(song_id))
                                .add(entities::song::Column::PlaylistId.eq(playlist_id)),
                        )
                        .exec(txn)
                        .await?;
                    if result.rows_affected > 0 {
                        recompute_playlist_metrics(txn, playlist_id).await?;
                    }
                    Ok(result.rows_affected)
                })
            })
            .await
            .map_err(|e| {
                map_db_err(
                    flatten_transaction_error(e),
                    "Failed to remove song from playlist",
                )
            })?;

        if removed == 0 {
            return Err(PlaylistError::NotFound("Song".to_string()));
        }
        Ok(())
    }

    pub async fn delete_playlist(&self, owner_user_id: &str, playlist_id: i64) -> Result<(), PlaylistError> {
        let playlist = self.require_owner(owner_user_id, playlist_id).await?;

        entities::playlist::Entity::delete_by_id(playlist.id)
            .exec(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to delete playlist"))?;

        if let Err(e) = refresh_user_stats(&self.db.conn, owner_user_id).await {
            log::warn!("Failed to refresh stats for user {owner_user_id}: {e}");
        }
        Ok(())
    }

    /// Absent preferences are not an error.
    pub async fn get_user_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<entities::user_preferences::Model>, PlaylistError> {
        entities::user_preferences::Entity::find_by_id(user_id.to_string())
            .one(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get user preferences"))
    }

    async fn songs_for(
        &self,
        playlist_id: i64,
    ) -> Result<Vec<entities::song::Model>, PlaylistError> {
        entities::song::Entity::find()
            .filter(entities::song::Column::PlaylistId.eq(playlist_id))
            .order_by_asc(entities::song::Column::Id)
            .all(&self.db.conn)
            .await
            .map_err(|e| map_db_err(e, "Failed to get playlist songs"))
    }
}

/// Rewrite `song_count` and `total_duration` from the playlist's current songs.
pub(crate) async fn recompute_playlist_metrics<C: ConnectionTrait>(
    conn: &C,
    playlist_id: i64,
) -> Result<entities::playlist::Model, DbErr> {
    let songs = entities::song::Entity::find()
        .filter(entities::song::Column::PlaylistId.eq(playlist_id))
        .all(conn)
        .await?;

    let song_count = songs.len() as i32;
    let total_duration: i64 = songs.iter().map(|s| i64::from(s.duration.max(0))).sum();

    let playlist = entities::playlist::Entity::find_by_id(playlist_id)
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("Playlist".to_string()))?;

    let mut active: entities::playlist::ActiveModel = playlist.into();
    active.song_count = Set(song_count);
    active.total_duration = Set(total_duration);
    let updated = active.update(conn).await?;

    refresh_user_stats(conn, &updated.user_id).await?;
    Ok(updated)
}

/// Rewrite the user's stats row from their playlists.
pub(crate) async fn refresh_user_stats<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> Result<(), DbErr> {
    let playlists = entities::playlist::Entity::find()
        .filter(entities::playlist::Column::UserId.eq(user_id))
        .all(conn)
        .await?;

    let stats = entities::user_stats::ActiveModel {
        user_id: Set(user_id.to_string()),
        playlists_created: Set(playlists.len() as i64),
        songs_added: Set(playlists.iter().map(|p| i64::from(p.song_count)).sum()),
        total_duration: Set(playlists.iter().map(|p| p.total_duration).sum()),
        updated_at: Set(chrono::Utc::now().timestamp()),
    };

    entities::user_stats::Entity::insert(stats)
        .on_conflict(
            OnConflict::column(entities::user_stats::Column::UserId)
                .update_columns([
                    entities::user_stats::Column::PlaylistsCreated,
                    entities::user_stats::Column::SongsAdded,
                    entities::user_stats::Column::TotalDuration,
                    entities::user_stats::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seed_user, test_db};

    fn song(title: &str, artist: &str, duration: Option<i32>) -> NewSong {
        NewSong {
            title: title.to_string(),
            artist: artist.to_string(),
            duration,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_playlist_defaults() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);

        let playlist = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();

        assert_eq!(playlist.name, "Untitled Playlist");
        assert!(!playlist.is_public);
        assert_eq!(playlist.song_count, 0);
        assert_eq!(playlist.total_duration, 0);
    }

    #[tokio::test]
    async fn test_create_playlist_for_unknown_user_is_constraint_violation() {
        let db = test_db().await;
        let service = PlaylistService::new(db);

        let err = service
            .create_playlist("ghost", NewPlaylist::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PlaylistError::ConstraintViolation(_)));
        assert_eq!(err.to_string(), "Invalid reference to another resource");
    }

    #[tokio::test]
    async fn test_add_song_updates_aggregates() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);
        let playlist = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();

        service
            .add_song(playlist.id, song("Teardrop", "Massive Attack", Some(330)))
            .await
            .unwrap();
        service
            .add_song(playlist.id, song("Unfinished Sympathy", "Massive Attack", None))
            .await
            .unwrap();

        let stored = service.get_playlist(Some("u1"), playlist.id).await.unwrap();
        assert_eq!(stored.playlist.song_count, 2);
        assert_eq!(stored.playlist.total_duration, 330);
        assert_eq!(stored.songs[1].duration, 0);
    }

    #[tokio::test]
    async fn test_add_song_requires_title_and_artist() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);
        let playlist = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();

        let err = service
            .add_song(playlist.id, song("   ", "Someone", None))
            .await
            .unwrap_err();

        assert!(matches!(err, PlaylistError::InvalidInput(_)));
        let stored = service.get_playlist(Some("u1"), playlist.id).await.unwrap();
        assert!(stored.songs.is_empty());
    }

    #[tokio::test]
    async fn test_add_song_truncates_long_fields() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);
        let playlist = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();

        let long = "é".repeat(250);
        let stored = service
            .add_song(
                playlist.id,
                NewSong {
                    album: Some(long.clone()),
                    ..song(&long, &long, Some(200))
                },
            )
            .await
            .unwrap();

        assert_eq!(stored.title.chars().count(), MAX_SONG_FIELD_LENGTH);
        assert_eq!(stored.artist.chars().count(), MAX_SONG_FIELD_LENGTH);
        assert_eq!(stored.album.unwrap().chars().count(), MAX_SONG_FIELD_LENGTH);
    }

    #[tokio::test]
    async fn test_add_song_to_missing_playlist_fails() {
        let db = test_db().await;
        let service = PlaylistService::new(db);

        let err = service
            .add_song(999, song("Title", "Artist", Some(100)))
            .await
            .unwrap_err();

        assert!(matches!(err, PlaylistError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_remove_song_reduces_aggregates_by_song() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);
        let playlist = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();

        service
            .add_song(playlist.id, song("A", "X", Some(200)))
            .await
            .unwrap();
        let removed = service
            .add_song(playlist.id, song("B", "Y", Some(215)))
            .await
            .unwrap();
        let before = service.get_playlist(Some("u1"), playlist.id).await.unwrap();

        service.remove_song(playlist.id, removed.id).await.unwrap();

        let after = service.get_playlist(Some("u1"), playlist.id).await.unwrap();
        assert_eq!(after.playlist.song_count, before.playlist.song_count - 1);
        assert_eq!(
            after.playlist.total_duration,
            before.playlist.total_duration - 215
        );
    }

    #[tokio::test]
    async fn test_remove_song_requires_matching_playlist() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);
        let first = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();
        let second = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();
        let stored = service
            .add_song(first.id, song("A", "X", Some(200)))
            .await
            .unwrap();

        let err = service.remove_song(second.id, stored.id).await.unwrap_err();

        assert!(matches!(err, PlaylistError::NotFound(_)));
        let first = service.get_playlist(Some("u1"), first.id).await.unwrap();
        assert_eq!(first.playlist.song_count, 1);
    }

    #[tokio::test]
    async fn test_private_playlist_hidden_from_other_users() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db);
        let private = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();
        let public = service
            .create_playlist(
                "u1",
                NewPlaylist {
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            service.get_playlist(Some("u2"), private.id).await,
            Err(PlaylistError::NotFound(_))
        ));
        assert!(matches!(
            service.get_playlist(None, private.id).await,
            Err(PlaylistError::NotFound(_))
        ));
        assert!(service.get_playlist(None, public.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_user_playlists_newest_first() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        seed_user(&db, "u2").await;
        let service = PlaylistService::new(db);
        for name in ["first", "second", "third"] {
            service
                .create_playlist(
                    "u1",
                    NewPlaylist {
                        name: Some(name.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        service
            .create_playlist("u2", NewPlaylist::default())
            .await
            .unwrap();

        let result = service
            .list_user_playlists("u1", None, Some(2))
            .await
            .unwrap();

        assert_eq!(result.total_count, 3);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].playlist.name, "third");
        assert_eq!(result.items[1].playlist.name, "second");
    }

    #[tokio::test]
    async fn test_user_stats_follow_playlists() {
        let db = test_db().await;
        seed_user(&db, "u1").await;
        let service = PlaylistService::new(db.clone());
        let playlist = service
            .create_playlist("u1", NewPlaylist::default())
            .await
            .unwrap();
        service
            .add_song(playlist.id, song("A", "X", Some(180)))
            .await
            .unwrap();

        let stats = entities::user_stats::Entity::find_by_id("u1".to_string())
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.playlists_created, 1);
        assert_eq!(stats.songs_added, 1);
        assert_eq!(stats.total_duration, 180);

        service.delete_playlist("u1", playlist.id).await.unwrap();
        let stats = entities::user_stats::Entity::find_by_id("u1".to_string())
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.playlists_created, 0);
        assert_eq!(stats.total_duration, 0);
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
