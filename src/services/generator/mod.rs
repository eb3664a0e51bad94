//! Prompt-driven playlist generation.

pub mod client;
pub mod parse;
pub mod prompt;

use std::sync::Arc;

use tracing::instrument;

use crate::auth_rs::AuthUser;
use crate::config::CompletionConfig;
use crate::error::PlaylistError;
use crate::groq_rs::{ChatCompletionRequest, ChatMessage};
use crate::ports::completion::CompletionClient;
use crate::services::playlist::{NewPlaylist, PlaylistService, PlaylistWithSongs, truncate_chars};
use crate::services::user::UserService;
use parse::{extract_json_array, validate_songs};
use prompt::{SYSTEM_PROMPT, compose_prompt};

pub const DEFAULT_SONG_COUNT: usize = 10;
pub const MAX_SONG_COUNT: usize = 50;
pub const MAX_TOKENS_LIMIT: u32 = 8192;
/// Stripped from the output by the completion API when it ends the array.
pub const STOP_SEQUENCE: &str = "}]";

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&CompletionConfig> for GeneratorSettings {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub mood: Option<String>,
    pub song_count: Option<usize>,
}

/// Overrides for a single suggestion call.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedPlaylist {
    pub playlist: PlaylistWithSongs,
    pub songs_attempted: usize,
    pub songs_persisted: usize,
}

pub struct PlaylistGenerator<C: CompletionClient> {
    completion: C,
    playlists: Arc<PlaylistService>,
    users: Arc<UserService>,
    settings: GeneratorSettings,
}

impl<C: CompletionClient> PlaylistGenerator<C> {
    pub fn new(
        completion: C,
        playlists: Arc<PlaylistService>,
        users: Arc<UserService>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            completion,
            playlists,
            users,
            settings,
        }
    }

    /// Generate and store a playlist for `user` from a free-text prompt.
    ///
    /// Songs that fail to insert are skipped, so `songs_persisted` may be lower than
    /// `songs_attempted`.
    #[instrument(skip(self, user), fields(song_count = ?request.song_count))]
    pub async fn generate(
        &self,
        user: Option<&AuthUser>,
        request: GenerateRequest,
    ) -> Result<GeneratedPlaylist, PlaylistError> {
        let user = user.ok_or(PlaylistError::AuthenticationRequired)?;

        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(PlaylistError::InvalidInput("Prompt is required".to_string()));
        }
        let song_count = request.song_count.unwrap_or(DEFAULT_SONG_COUNT);
        if !(1..=MAX_SONG_COUNT).contains(&song_count) {
            return Err(PlaylistError::InvalidInput(format!(
                "Song count must be between 1 and {MAX_SONG_COUNT}"
            )));
        }
        let mood = request
            .mood
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());

        let preferences = match self.playlists.get_user_preferences(&user.id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                log::warn!("Generating without preferences for user {}: {}", user.id, e);
                None
            }
        };

        let instruction = compose_prompt(prompt, song_count, mood, preferences.as_ref())?;
        let content = self
            .request_completion(SYSTEM_PROMPT, &instruction, &SuggestionOptions::default())
            .await?;

        let items = extract_json_array(&content).inspect_err(|_| {
            log::error!("Invalid completion response: {content}");
        })?;
        let songs = validate_songs(items, song_count)?;

        self.users.ensure_user_profile(user).await?;

        let playlist = self
            .playlists
            .create_playlist(
                &user.id,
                NewPlaylist {
                    name: Some(truncate_chars(prompt, 100)),
                    description: Some(truncate_chars(
                        &format!("AI-generated playlist based on: {prompt}"),
                        500,
                    )),
                    prompt: Some(truncate_chars(prompt, 1000)),
                    mood: mood.map(str::to_string),
                    is_public: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        let songs_attempted = songs.len();
        let mut songs_persisted = 0;
        for song in songs {
            let title = song.title.clone();
            match self.playlists.add_song(playlist.id, song.into()).await {
                Ok(_) => songs_persisted += 1,
                Err(e) => log::error!("Failed to add '{title}' to playlist {}: {e}", playlist.id),
            }
        }

        log::info!(
            "Generated playlist {} for user {} ({songs_persisted}/{songs_attempted} songs)",
            playlist.id,
            user.id
        );

        let playlist = self
            .playlists
            .get_playlist(Some(&user.id), playlist.id)
            .await?;
        Ok(GeneratedPlaylist {
            playlist,
            songs_attempted,
            songs_persisted,
        })
    }

    /// Raw suggestion call: the model's reply to `prompt`, terminated as a JSON array.
    #[instrument(skip(self, options))]
    pub async fn suggest(
        &self,
        prompt: &str,
        options: SuggestionOptions,
    ) -> Result<String, PlaylistError> {
        if prompt.trim().is_empty() {
            return Err(PlaylistError::InvalidInput("Prompt is required".to_string()));
        }
        let system_prompt = options
            .system_prompt
            .clone()
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string());
        self.request_completion(&system_prompt, prompt, &options).await
    }

    async fn request_completion(
        &self,
        system_prompt: &str,
        prompt: &str,
        options: &SuggestionOptions,
    ) -> Result<String, PlaylistError> {
        let temperature = options
            .temperature
            .unwrap_or(self.settings.temperature)
            .clamp(0.0, 2.0);
        let max_tokens = options
            .max_tokens
            .unwrap_or(self.settings.max_tokens)
            .clamp(1, MAX_TOKENS_LIMIT);

        let request = ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(prompt)],
            temperature,
            max_tokens,
            stop: vec![STOP_SEQUENCE.to_string()],
        };

        let completion = self.completion.complete(request).await.map_err(|e| {
            log::error!("Completion request failed: {e:?}");
            PlaylistError::GenerationFailed(e.to_string())
        })?;

        let content = completion
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PlaylistError::GenerationFailed("No suggestions generated".to_string()))?;

        terminate_array(content, completion.finish_reason.as_deref())
    }
}

/// Restore the stop sequence the API strips when the model closed the array.
///
/// Only a cut-off object is a generation failure. Anything else is handed on unchanged so the
/// array extraction can reject it as malformed.
fn terminate_array(content: &str, finish_reason: Option<&str>) -> Result<String, PlaylistError> {
    if finish_reason == Some("length") {
        return Err(PlaylistError::GenerationFailed(
            "Incomplete JSON response".to_string(),
        ));
    }

    let Some(array_start) = content.find('[') else {
        return Ok(content.to_string());
    };
    let open_object = match (content.rfind('{'), content.rfind(']')) {
        (Some(open), Some(close)) => open > close && open > array_start,
        (Some(open), None) => open > array_start,
        (None, _) => false,
    };
    if !open_object {
        return Ok(content.to_string());
    }

    if finish_reason == Some("stop") {
        return Ok(format!("{content}{STOP_SEQUENCE}"));
    }
    Err(PlaylistError::GenerationFailed(
        "Incomplete JSON response".to_string(),
    ))
}
