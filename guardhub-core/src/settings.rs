//! Durable key/value settings store and the sound preference blob kept in it.
//!
//! Stores deal in whole blobs: `get` returns everything stored under a key,
//! `set` replaces it. Callers own the encoding.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HubError, Result};

/// Key under which [`SoundSettings`] are stored.
pub const SOUND_SETTINGS_KEY: &str = "guardhub.sound-settings";

pub const DEFAULT_SOUND_ENABLED: bool = true;
pub const DEFAULT_SOUND_VOLUME: f32 = 0.4;

/// Get/set-whole-blob persistence.
pub trait SettingsStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HubError::Storage(format!("read {key}: {e}"))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        write_atomically(&path, value).map_err(|e| HubError::Storage(format!("write {key}: {e}")))
    }
}

fn write_atomically(path: &Path, value: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, value)?;
    fs::rename(&tmp, path)
}

/// In-memory store for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// User sound preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SoundSettings {
    pub enabled: bool,
    pub volume: f32,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_SOUND_ENABLED,
            volume: DEFAULT_SOUND_VOLUME,
        }
    }
}

impl SoundSettings {
    pub fn normalize(&mut self) {
        self.volume = clamp_volume(self.volume);
    }

    /// Read-through with safe defaulting: a missing, unreadable or corrupt
    /// blob yields the defaults.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let raw = match store.get(SOUND_SETTINGS_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("sound settings unreadable, using defaults: {e}");
                None
            }
        };
        let mut settings = raw
            .and_then(|raw| match serde_json::from_str::<SoundSettings>(&raw) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("sound settings corrupt, using defaults: {e}");
                    None
                }
            })
            .unwrap_or_default();
        settings.normalize();
        settings
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<()> {
        let json = serde_json::to_string(self)?;
        store.set(SOUND_SETTINGS_KEY, &json)
    }
}

/// Clamp into `[0, 1]`; NaN becomes silence.
pub fn clamp_volume(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
