use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, OptionExt, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth_rs::api::AuthEndpoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database")]
    database: String,
    /// Holds the local session and OAuth redirect records
    #[serde(default = "default_data_directory")]
    data_directory: String,
    /// Where the client is sent after signing out
    #[serde(default = "default_home_url")]
    pub home_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub profile_sync: ProfileSyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_database() -> String {
    "~/.local/share/smart-playlist/smart-playlist.db".to_string()
}

fn default_data_directory() -> String {
    "~/.local/share/smart-playlist".to_string()
}

fn default_home_url() -> String {
    "http://localhost:5173/".to_string()
}

fn default_redirect_url() -> String {
    "http://localhost:5173/auth/callback".to_string()
}

fn default_completion_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "mixtral-8x7b-32768".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            redirect_url: default_redirect_url(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ProfileSyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            data_directory: default_data_directory(),
            home_url: default_home_url(),
            auth: AuthConfig::default(),
            completion: CompletionConfig::default(),
            profile_sync: ProfileSyncConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("smart-playlist").join("config.toml"))
    }

    /// Load the default config file, falling back to built-in defaults when it doesn't exist
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the default config to the default path, if it doesn't exist
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("No config directory on this platform")?;
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<()> {
        if path.exists() {
            log::info!("Config already exists at: {}", path.display());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).wrap_err_with(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.expand_path(&self.database)
    }

    pub fn data_directory_path(&self) -> PathBuf {
        self.expand_path(&self.data_directory)
    }

    /// Auth service endpoint, falling back to `SUPABASE_URL` / `SUPABASE_ANON_KEY`
    pub fn auth_endpoint(&self) -> Result<AuthEndpoint> {
        let url = self
            .auth
            .url
            .clone()
            .or_else(|| std::env::var("SUPABASE_URL").ok())
            .ok_or_eyre("Missing auth service URL. Set auth.url or SUPABASE_URL")?;
        let api_key = self
            .auth
            .anon_key
            .clone()
            .or_else(|| std::env::var("SUPABASE_ANON_KEY").ok())
            .ok_or_eyre("Missing auth service key. Set auth.anon_key or SUPABASE_ANON_KEY")?;
        let base_url =
            Url::parse(&url).wrap_err_with(|| format!("Invalid auth service URL: {url}"))?;

        Ok(AuthEndpoint { base_url, api_key })
    }

    /// Completion API key, falling back to `GROQ_API_KEY`
    pub fn completion_api_key(&self) -> Result<String> {
        self.completion
            .api_key
            .clone()
            .or_else(|| std::env::var("GROQ_API_KEY").ok())
            .ok_or_eyre("Missing completion API key. Set completion.api_key or GROQ_API_KEY")
    }

    /// The origin the OAuth callback returns to
    pub fn redirect_origin(&self) -> String {
        Url::parse(&self.auth.redirect_url)
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or_else(|_| self.home_url.trim_end_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
database = "/tmp/playlists.db"

[completion]
model = "llama-3.1-8b-instant"
"#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/playlists.db"));
        assert_eq!(config.completion.model, "llama-3.1-8b-instant");
        assert_eq!(config.completion.max_tokens, 4000);
        assert_eq!(config.profile_sync.max_attempts, 3);
        assert_eq!(config.auth.redirect_url, "http://localhost:5173/auth/callback");
    }

    #[test]
    fn test_redirect_origin() {
        let config = Config::default();
        assert_eq!(config.redirect_origin(), "http://localhost:5173");
    }

    #[test]
    fn test_auth_endpoint_from_config() {
        let mut config = Config::default();
        config.auth.url = Some("https://project.supabase.co".to_string());
        config.auth.anon_key = Some("anon".to_string());

        let endpoint = config.auth_endpoint().unwrap();
        assert_eq!(endpoint.base_url.as_str(), "https://project.supabase.co/");
        assert_eq!(endpoint.api_key, "anon");
    }

    #[test]
    fn test_write_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::write_default_to(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();

        assert_eq!(loaded.completion.model, "mixtral-8x7b-32768");
        assert_eq!(loaded.home_url, "http://localhost:5173/");
    }
}
