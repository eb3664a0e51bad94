use async_graphql::{Context, InputObject, Object, SimpleObject};

use crate::http_server::graphql::context::{get_app_state, require_user};
use crate::http_server::graphql::playlist_queries::{
    Playlist, Song, map_playlist, map_playlist_with_songs, map_song,
};
use crate::http_server::graphql_error::GraphqlResult;
use crate::services::generator::GenerateRequest;
use crate::services::playlist::{NewPlaylist, NewSong};

#[derive(Debug, Clone, InputObject)]
pub struct CreatePlaylistInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub mood: Option<String>,
    pub is_public: Option<bool>,
    pub cover_url: Option<String>,
    pub spotify_id: Option<String>,
}

#[derive(Debug, Clone, InputObject)]
pub struct SongInput {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<i32>,
    pub year: Option<i32>,
    pub bpm: Option<i32>,
    pub key: Option<String>,
    pub spotify_id: Option<String>,
    pub youtube_id: Option<String>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct GeneratedPlaylist {
    pub playlist: Playlist,
    pub songs_attempted: i32,
    pub songs_persisted: i32,
}

#[derive(Default)]
pub struct PlaylistMutation;

#[Object]
impl PlaylistMutation {
    async fn generate_playlist(
        &self,
        ctx: &Context<'_>,
        prompt: String,
        mood: Option<String>,
        song_count: Option<i32>,
    ) -> GraphqlResult<GeneratedPlaylist> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;

        let generated = app_state
            .generator
            .generate(
                Some(user),
                GenerateRequest {
                    prompt,
                    mood,
                    song_count: song_count.map(|count| count.max(0) as usize),
                },
            )
            .await?;

        Ok(GeneratedPlaylist {
            playlist: map_playlist_with_songs(generated.playlist)?,
            songs_attempted: generated.songs_attempted as i32,
            songs_persisted: generated.songs_persisted as i32,
        })
    }

    async fn create_playlist(
        &self,
        ctx: &Context<'_>,
        input: CreatePlaylistInput,
    ) -> GraphqlResult<Playlist> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;
        app_state.users.ensure_user_profile(user).await?;

        let model = app_state
            .playlists
            .create_playlist(
                &user.id,
                NewPlaylist {
                    name: input.name,
                    description: input.description,
                    prompt: input.prompt,
                    mood: input.mood,
                    is_public: input.is_public,
                    cover_url: input.cover_url,
                    spotify_id: input.spotify_id,
                },
            )
            .await?;

        Ok(map_playlist(model, Vec::new())?)
    }

    async fn add_song(
        &self,
        ctx: &Context<'_>,
        playlist_id: i64,
        input: SongInput,
    ) -> GraphqlResult<Song> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;
        app_state.playlists.require_owner(&user.id, playlist_id).await?;

        let song = app_state
            .playlists
            .add_song(
                playlist_id,
                NewSong {
                    title: input.title,
                    artist: input.artist,
                    album: input.album,
                    duration: input.duration,
                    year: input.year,
                    bpm: input.bpm,
                    key: input.key,
                    spotify_id: input.spotify_id,
                    youtube_id: input.youtube_id,
                    preview_url: input.preview_url,
                },
            )
            .await?;

        Ok(map_song(song)?)
    }

    async fn remove_song(
        &self,
        ctx: &Context<'_>,
        playlist_id: i64,
        song_id: i64,
    ) -> GraphqlResult<bool> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;
        app_state.playlists.require_owner(&user.id, playlist_id).await?;

        app_state.playlists.remove_song(playlist_id, song_id).await?;
        Ok(true)
    }

    async fn delete_playlist(&self, ctx: &Context<'_>, id: i64) -> GraphqlResult<bool> {
        let app_state = get_app_state(ctx)?;
        let user = require_user(ctx)?;

        app_state.playlists.delete_playlist(&user.id, id).await?;
        Ok(true)
    }
}
