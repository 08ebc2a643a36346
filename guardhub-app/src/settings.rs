//! Persistent host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOAST_DURATION_MS: u64 = 4_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Directory holding `<cue>.wav` overrides. `None` uses `<data dir>/sounds`.
    pub sound_assets_dir: Option<PathBuf>,
    pub toast_duration_ms: u64,
    /// `None` disables the request timeout.
    pub request_timeout_ms: Option<u64>,
    pub preload_sounds: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            sound_assets_dir: None,
            toast_duration_ms: DEFAULT_TOAST_DURATION_MS,
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            preload_sounds: true,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.toast_duration_ms = self.toast_duration_ms.clamp(500, 60_000);
        self.request_timeout_ms = self.request_timeout_ms.map(|ms| ms.clamp(100, 120_000));
        self.sound_assets_dir = self
            .sound_assets_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Where sound cue overrides are looked up.
    pub fn assets_dir(&self, data_dir: &Path) -> PathBuf {
        self.sound_assets_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("sounds"))
    }
}

/// Apply `GUARDHUB_ASSETS_DIR` on top of the file settings.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    if let Some(dir) = std::env::var_os("GUARDHUB_ASSETS_DIR") {
        settings.sound_assets_dir = Some(PathBuf::from(dir));
    }
    settings.normalize();
}

/// `GUARDHUB_AUDIO=off` forces the silent backend.
pub fn audio_disabled_by_env() -> bool {
    std::env::var("GUARDHUB_AUDIO")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "0" | "false" | "none"))
        .unwrap_or(false)
}

pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("GuardHub")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("guardhub")
    }
}

/// `GUARDHUB_SETTINGS_PATH`, else `<data dir>/settings.json`.
pub fn default_settings_path() -> PathBuf {
    std::env::var_os("GUARDHUB_SETTINGS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| default_data_dir().join("settings.json"))
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                tracing::warn!(path = %path.display(), "settings file corrupt, using defaults: {e}");
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
