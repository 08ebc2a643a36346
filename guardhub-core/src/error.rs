use thiserror::Error;

/// All errors produced by guardhub-core.
///
/// Most of these never reach a caller: the sound engine and the settings
/// store log and absorb them. They exist so the absorbing code has something
/// precise to log.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("audio backend unavailable: {0}")]
    AudioUnavailable(String),

    #[error("sound asset could not be decoded: {0}")]
    AssetDecode(String),

    #[error("no loadable source among {tried} candidate(s)")]
    NoLoadableSource { tried: usize },

    #[error("settings storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
