use schemars::{JsonSchema, schema_for};
use serde::Deserialize;

use crate::entities::user_preferences;
use crate::error::PlaylistError;

pub const SYSTEM_PROMPT: &str = r#"You are SmartPlaylistAI, a music expert that builds personalized playlists. Reply with ONLY a valid JSON array of songs.

For every song consider:
- Title and artist (required)
- Album, year of release, BPM and duration in seconds (optional, include them only when confident)
- How the song fits the genre and mood of the playlist

Shape the playlist so it flows:
- Smooth transitions in energy and mood from one song to the next
- A mix of well-known and lesser-known tracks
- Consistent genres unless the request asks for variety

Always:
- Return exactly the number of songs requested
- Avoid repeating an artist unless asked to
- Respect the listener's genres, moods, BPM range and any era mentioned

Output format:
[
  {
    "title": "Song Title",
    "artist": "Artist Name",
    "album": "Album Name",
    "year": 2024,
    "bpm": 120,
    "duration": 180
  }
]"#;

/// One entry of the song list the model is asked to return.
#[allow(dead_code)]
#[derive(JsonSchema, Deserialize)]
struct SuggestedSong {
    title: String,
    artist: String,
    album: Option<String>,
    year: Option<i32>,
    bpm: Option<i32>,
    /// Seconds
    duration: Option<i32>,
}

/// The user message sent alongside [`SYSTEM_PROMPT`].
pub fn compose_prompt(
    prompt: &str,
    song_count: usize,
    mood: Option<&str>,
    preferences: Option<&user_preferences::Model>,
) -> Result<String, PlaylistError> {
    let json_schema = schema_for!(Vec<SuggestedSong>);
    let json_schema_str = serde_json::to_string_pretty(&json_schema).map_err(|e| {
        PlaylistError::GenerationFailed(format!("Failed to build response schema: {e}"))
    })?;

    let mut context = Vec::new();
    if let Some(preferences) = preferences {
        if !preferences.preferred_genres.0.is_empty() {
            context.push(format!(
                "- Preferred genres: {}",
                preferences.preferred_genres.0.join(", ")
            ));
        }
        if !preferences.favorite_artists.0.is_empty() {
            context.push(format!(
                "- Consider these artists: {}",
                preferences.favorite_artists.0.join(", ")
            ));
        }
        if let (Some(min), Some(max)) = (preferences.preferred_bpm_min, preferences.preferred_bpm_max)
        {
            context.push(format!("- BPM range: {min}-{max}"));
        }
    }
    context.push(match mood {
        Some(mood) => format!("- Target mood: {mood}"),
        None => "- Create a balanced mix of moods based on the prompt".to_string(),
    });

    let mood_rule = match mood {
        Some(mood) => format!("Songs should match the {mood} mood"),
        None => "Create a natural mood progression based on the prompt".to_string(),
    };

    Ok(format!(
        r#"Create a playlist with {song_count} songs based on: "{prompt}"

Additional context:
{context}

Return ONLY a valid JSON array of songs matching this schema:
{json_schema_str}

Rules:
1. The response starts with [ and ends with ]
2. No text before or after the JSON array
3. All strings are properly quoted
4. No trailing commas
5. Exactly {song_count} songs
6. No duplicate songs
7. Keep the response under 4000 characters
8. Include an estimated duration in seconds for each song (most songs run 180-240 seconds)
9. {mood_rule}"#,
        context = context.join("\n"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user_preferences::StringVec;

    fn preferences() -> user_preferences::Model {
        user_preferences::Model {
            user_id: "u1".to_string(),
            preferred_genres: StringVec(vec!["shoegaze".to_string(), "dream pop".to_string()]),
            favorite_artists: StringVec(vec!["Slowdive".to_string()]),
            preferred_moods: StringVec::default(),
            preferred_bpm_min: Some(90),
            preferred_bpm_max: Some(120),
            public_profile: false,
            show_playlists: true,
            allow_data_collection: true,
            share_listening_history: false,
            notification_settings: Default::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_prompt_embeds_preferences() {
        let prompt = compose_prompt("rainy day", 12, Some("melancholy"), Some(&preferences())).unwrap();

        assert!(prompt.contains("Create a playlist with 12 songs based on: \"rainy day\""));
        assert!(prompt.contains("- Preferred genres: shoegaze, dream pop"));
        assert!(prompt.contains("- Consider these artists: Slowdive"));
        assert!(prompt.contains("- BPM range: 90-120"));
        assert!(prompt.contains("- Target mood: melancholy"));
        assert!(prompt.contains("Songs should match the melancholy mood"));
        assert!(prompt.contains("\"title\""));
    }

    #[test]
    fn test_prompt_without_preferences_asks_for_balance() {
        let prompt = compose_prompt("road trip", 10, None, None).unwrap();

        assert!(prompt.contains("balanced mix of moods"));
        assert!(!prompt.contains("Preferred genres"));
        assert!(!prompt.contains("BPM range"));
    }

    #[test]
    fn test_prompt_needs_both_bpm_bounds() {
        let mut prefs = preferences();
        prefs.preferred_bpm_max = None;

        let prompt = compose_prompt("focus", 5, None, Some(&prefs)).unwrap();
        assert!(!prompt.contains("BPM range"));
    }
}
