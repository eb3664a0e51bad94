use rand::Rng;
use serde_json::Value;

use crate::error::PlaylistError;
use crate::services::playlist::NewSong;

/// Range used for songs the model gave no usable duration for, in seconds.
pub const FALLBACK_DURATION: std::ops::Range<i32> = 180..240;

/// A validated entry of the model's song list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongSuggestion {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub bpm: Option<i32>,
    pub duration: i32,
}

impl From<SongSuggestion> for NewSong {
    fn from(song: SongSuggestion) -> Self {
        NewSong {
            title: song.title,
            artist: song.artist,
            album: song.album,
            duration: Some(song.duration),
            year: song.year,
            bpm: song.bpm,
            ..Default::default()
        }
    }
}

/// Parse the span from the first `[` to the last `]` as a JSON array.
pub fn extract_json_array(content: &str) -> Result<Vec<Value>, PlaylistError> {
    let start = content
        .find('[')
        .ok_or_else(|| PlaylistError::MalformedResponse("No JSON array found in response".to_string()))?;
    let end = content.rfind(']').ok_or_else(|| {
        PlaylistError::MalformedResponse("Incomplete JSON array in response".to_string())
    })?;
    if end < start {
        return Err(PlaylistError::MalformedResponse(
            "Incomplete JSON array in response".to_string(),
        ));
    }

    match serde_json::from_str::<Value>(&content[start..=end]) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(PlaylistError::MalformedResponse(
            "Response is not an array".to_string(),
        )),
        Err(e) => Err(PlaylistError::MalformedResponse(format!("Invalid JSON: {e}"))),
    }
}

/// Keep at most `song_count` entries and validate each of them.
///
/// Any kept entry without a title or artist fails the whole list.
pub fn validate_songs(
    mut items: Vec<Value>,
    song_count: usize,
) -> Result<Vec<SongSuggestion>, PlaylistError> {
    if items.len() != song_count {
        log::warn!("Expected {song_count} songs, got {}", items.len());
    }
    items.truncate(song_count);

    let mut rng = rand::rng();
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let title = text_field(item, "title");
            let artist = text_field(item, "artist");
            let (Some(title), Some(artist)) = (title, artist) else {
                return Err(PlaylistError::MalformedResponse(format!(
                    "Song at index {index} is missing required fields"
                )));
            };

            Ok(SongSuggestion {
                title,
                artist,
                album: text_field(item, "album"),
                year: number_field(item, "year"),
                bpm: number_field(item, "bpm"),
                duration: number_field(item, "duration")
                    .unwrap_or_else(|| rng.random_range(FALLBACK_DURATION)),
            })
        })
        .collect()
}

fn text_field(item: &Value, key: &str) -> Option<String> {
    let text = match item.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Numbers and numeric strings are accepted. Zero, negative and anything else is absent.
fn number_field(item: &Value, key: &str) -> Option<i32> {
    let value = match item.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !value.is_finite() || value <= 0.0 || value > f64::from(i32::MAX) {
        return None;
    }
    Some(value.round() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_ignores_surrounding_text() {
        let items = extract_json_array(
            r#"Here you go: [{"title": "Windowlicker", "artist": "Aphex Twin"}] Enjoy!"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_extract_without_brackets() {
        assert!(matches!(
            extract_json_array("no songs today"),
            Err(PlaylistError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json_array(r#"[{"title": "a", "artist": "b"}"#),
            Err(PlaylistError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_extract_rejects_invalid_json() {
        assert!(matches!(
            extract_json_array(r#"[{"title": "a",}]"#),
            Err(PlaylistError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_validate_coerces_numbers() {
        let songs = validate_songs(
            vec![json!({
                "title": "  Glory Box ",
                "artist": "Portishead",
                "album": "Dummy",
                "year": "1994",
                "bpm": 77.4,
                "duration": "306",
            })],
            10,
        )
        .unwrap();

        assert_eq!(
            songs[0],
            SongSuggestion {
                title: "Glory Box".to_string(),
                artist: "Portishead".to_string(),
                album: Some("Dummy".to_string()),
                year: Some(1994),
                bpm: Some(77),
                duration: 306,
            }
        );
    }

    #[test]
    fn test_validate_drops_non_numeric_fields() {
        let songs = validate_songs(
            vec![json!({"title": "a", "artist": "b", "year": "nineties", "bpm": [120]})],
            1,
        )
        .unwrap();

        assert_eq!(songs[0].year, None);
        assert_eq!(songs[0].bpm, None);
    }

    #[test]
    fn test_missing_duration_falls_back() {
        for _ in 0..50 {
            let songs =
                validate_songs(vec![json!({"title": "a", "artist": "b", "duration": null})], 1)
                    .unwrap();
            assert!(FALLBACK_DURATION.contains(&songs[0].duration));
        }
    }

    #[test]
    fn test_missing_artist_is_malformed() {
        let err = validate_songs(
            vec![
                json!({"title": "a", "artist": "b"}),
                json!({"title": "c", "artist": "   "}),
            ],
            2,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to parse playlist: Song at index 1 is missing required fields"
        );
    }

    #[test]
    fn test_invalid_entries_past_the_requested_count_are_ignored() {
        let songs = validate_songs(
            vec![json!({"title": "a", "artist": "b"}), json!({"title": "broken"})],
            1,
        )
        .unwrap();
        assert_eq!(songs.len(), 1);
    }
}
