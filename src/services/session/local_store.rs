use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub const AUTH_REDIRECT_KEY: &str = "auth_redirect";
pub const AUTH_STATE_KEY: &str = "auth_state";
pub const SESSION_KEY: &str = "session";

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("Failed to access local records at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode local record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Small JSON key/value file for client-side records that must survive restarts.
///
/// Every write rewrites the whole file. Without a path the store lives in memory only.
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<Map<String, Value>>,
}

impl LocalStore {
    /// Open the store at `path`, starting empty when the file doesn't exist yet.
    pub fn open(path: &Path) -> Result<Self, LocalStoreError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) if contents.trim().is_empty() => Map::new(),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!(
                        "Discarding unreadable local records at {}: {}",
                        path.display(),
                        e
                    );
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(source) => {
                return Err(LocalStoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Map::new()),
        }
    }

    /// A record that no longer decodes is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.lock();
        let value = entries.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Ignoring malformed local record '{key}': {e}");
                None
            }
        }
    }

    /// Memory is only updated once the file write succeeded.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), LocalStoreError> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.lock();
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        let mut entries = self.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    /// Read a record and delete it in one step.
    pub fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LocalStoreError> {
        let value = self.get(key);
        self.remove(key)?;
        Ok(value)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), LocalStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| LocalStoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_vec_pretty(entries)?;
        let tmp = path.with_extension("json.tmp");
        write_private(&tmp, &contents).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

/// The records include session tokens, so the file is readable by its owner only.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    // `mode` only applies when the file is created
    #[cfg(unix)]
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()
}
