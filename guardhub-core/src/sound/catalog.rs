//! Cue names, asset locations and fallback tones.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of semantic sound cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCue {
    Welcome,
    Click,
    Success,
    Add,
    Delete,
    Error,
    Download,
    Notification,
}

impl SoundCue {
    pub const ALL: [SoundCue; 8] = [
        SoundCue::Welcome,
        SoundCue::Click,
        SoundCue::Success,
        SoundCue::Add,
        SoundCue::Delete,
        SoundCue::Error,
        SoundCue::Download,
        SoundCue::Notification,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SoundCue::Welcome => "welcome",
            SoundCue::Click => "click",
            SoundCue::Success => "success",
            SoundCue::Add => "add",
            SoundCue::Delete => "delete",
            SoundCue::Error => "error",
            SoundCue::Download => "download",
            SoundCue::Notification => "notification",
        }
    }
}

impl fmt::Display for SoundCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundCue {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        SoundCue::ALL
            .into_iter()
            .find(|cue| cue.as_str() == name)
            .ok_or(())
    }
}

/// Oscillator shape for synthesized tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

/// A procedurally generated tone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tone {
    pub frequency: f32,
    pub duration_ms: u32,
    pub base_volume: f32,
    pub waveform: Waveform,
}

/// Played for names outside the catalog.
pub const DEFAULT_TONE: Tone = Tone {
    frequency: 440.0,
    duration_ms: 120,
    base_volume: 0.4,
    waveform: Waveform::Sine,
};

/// Everything the engine knows about one cue.
#[derive(Debug, Clone)]
pub struct SoundAsset {
    pub cue: SoundCue,
    /// Candidate files, tried in order; the first that decodes wins.
    pub sources: Vec<PathBuf>,
    pub base_volume: f32,
    pub fallback: Tone,
    /// Load at engine construction rather than on first play.
    pub preload: bool,
}

/// Asset table, one entry per [`SoundCue`].
#[derive(Debug, Clone)]
pub struct SoundCatalog {
    assets: Vec<SoundAsset>,
}

impl SoundCatalog {
    /// The stock table, resolving files under `assets_dir`.
    ///
    /// Each cue looks for `<assets_dir>/<cue>.wav`, then the bundled
    /// `<assets_dir>/default/<cue>.wav`.
    pub fn with_assets_dir(assets_dir: &Path) -> Self {
        let assets = SoundCue::ALL
            .into_iter()
            .map(|cue| {
                let (base_volume, fallback, preload) = stock_entry(cue);
                SoundAsset {
                    cue,
                    sources: vec![
                        assets_dir.join(format!("{cue}.wav")),
                        assets_dir.join("default").join(format!("{cue}.wav")),
                    ],
                    base_volume,
                    fallback,
                    preload,
                }
            })
            .collect();
        Self { assets }
    }

    /// Build from explicit assets. Cues missing from `assets` get the stock
    /// entry with no source files, so every cue still resolves to a tone.
    pub fn from_assets(assets: Vec<SoundAsset>) -> Self {
        let mut catalog = Self::with_assets_dir(Path::new(""));
        for asset in &mut catalog.assets {
            asset.sources.clear();
        }
        for asset in assets {
            let idx = asset.cue as usize;
            catalog.assets[idx] = asset;
        }
        catalog
    }

    pub fn get(&self, cue: SoundCue) -> &SoundAsset {
        // Entries are kept in `SoundCue::ALL` order.
        &self.assets[cue as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoundAsset> {
        self.assets.iter()
    }
}

fn stock_entry(cue: SoundCue) -> (f32, Tone, bool) {
    let tone = |frequency, duration_ms, base_volume, waveform| Tone {
        frequency,
        duration_ms,
        base_volume,
        waveform,
    };
    match cue {
        SoundCue::Welcome => (0.5, tone(523.25, 400, 0.5, Waveform::Sine), true),
        SoundCue::Click => (0.3, tone(1200.0, 40, 0.3, Waveform::Triangle), true),
        SoundCue::Success => (0.5, tone(880.0, 180, 0.5, Waveform::Sine), true),
        SoundCue::Add => (0.45, tone(660.0, 120, 0.45, Waveform::Triangle), false),
        SoundCue::Delete => (0.4, tone(330.0, 160, 0.4, Waveform::Sawtooth), false),
        SoundCue::Error => (0.45, tone(220.0, 300, 0.45, Waveform::Square), true),
        SoundCue::Download => (0.45, tone(740.0, 200, 0.45, Waveform::Sine), false),
        SoundCue::Notification => (0.5, tone(587.33, 220, 0.5, Waveform::Triangle), true),
    }
}
