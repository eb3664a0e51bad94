use async_graphql::{Context, Object, SimpleObject};
use chrono::{DateTime, Utc};
use color_eyre::eyre::OptionExt;

use crate::entities;
use crate::error::PlaylistError;
use crate::http_server::graphql::context::{current_user, get_app_state, require_user};
use crate::http_server::graphql_error::GraphqlResult;
use crate::services::playlist::PlaylistWithSongs;

#[derive(Debug, Clone, SimpleObject)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Seconds
    pub duration: i32,
    pub year: Option<i32>,
    pub bpm: Option<i32>,
    pub key: Option<String>,
    pub spotify_id: Option<String>,
    pub youtube_id: Option<String>,
    pub preview_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Playlist {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub mood: Option<String>,
    pub is_public: bool,
    pub cover_url: Option<String>,
    pub spotify_id: Option<String>,
    pub song_count: i32,
    /// Seconds
    pub total_duration: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct PlaylistsResponse {
    pub playlists: Vec<Playlist>,
    pub total_count: i64,
    pub page: i32,
    pub page_size: i32,
}

pub(crate) fn timestamp(secs: i64) -> color_eyre::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_secs(secs).ok_or_eyre("Failed to convert timestamp to DateTime<Utc>")
}

pub(crate) fn map_song(song: entities::song::Model) -> color_eyre::Result<Song> {
    Ok(Song {
        id: song.id,
        title: song.title,
        artist: song.artist,
        album: song.album,
        duration: song.duration,
        year: song.year,
        bpm: song.bpm,
        key: song.key,
        spotify_id: song.spotify_id,
        youtube_id: song.youtube_id,
        preview_url: song.preview_url,
        created_at: timestamp(song.created_at)?,
    })
}

pub(crate) fn map_playlist(
    playlist: entities::playlist::Model,
    songs: Vec<entities::song::Model>,
) -> color_eyre::Result<Playlist> {
    Ok(Playlist {
        id: playlist.id,
        user_id: playlist.user_id,
        name: playlist.name,
        description: playlist.description,
        prompt: playlist.prompt,
        mood: playlist.mood,
        is_public: playlist.is_public,
        cover_url: playlist.cover_url,
        spotify_id: playlist.spotify_id,
        song_count: playlist.song_count,
        total_duration: playlist.total_duration,
        created_at: timestamp(playlist.created_at)?,
        updated_at: timestamp(playlist.updated_at)?,
        songs: songs
            .into_iter()
            .map(map_song)
            .collect::<color_eyre::Result<Vec<_>>>()?,
    })
}

pub(crate) fn map_playlist_with_songs(pws: PlaylistWithSongs) -> color_eyre::Result<Playlist> {
    map_playlist(pws.playlist, pws.songs)
}

#[derive(Default)]
pub struct PlaylistQuery;

#[Object]
impl PlaylistQuery {
    /// The signed-in user's playlists, newest first.
    async fn my_playlists(
        &self,
        ctx: &Context<'_>,
        page: Option<i32>,
        page_size: Option<i32>,
    ) -> GraphqlResult<PlaylistsResponse> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;

        let result = app_state
            .playlists
            .list_user_playlists(&user.id, page, page_size)
            .await?;

        let playlists = result
            .items
            .into_iter()
            .map(map_playlist_with_songs)
            .collect::<color_eyre::Result<Vec<_>>>()?;

        Ok(PlaylistsResponse {
            playlists,
            total_count: result.total_count as i64,
            page: result.page as i32,
            page_size: result.page_size as i32,
        })
    }

    /// A playlist owned by the caller, or any public playlist.
    async fn playlist(&self, ctx: &Context<'_>, id: i64) -> GraphqlResult<Option<Playlist>> {
        let app_state = get_app_state(ctx)?;
        let viewer = current_user(ctx).map(|user| user.id.as_str());

        match app_state.playlists.get_playlist(viewer, id).await {
            Ok(pws) => Ok(Some(map_playlist_with_songs(pws)?)),
            Err(PlaylistError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
