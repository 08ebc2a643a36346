//! Audio playback abstraction.
//!
//! The `AudioBackend` trait decouples the sound policy from any specific
//! output (cpal device, silent headless sink, test recorder).

use std::path::PathBuf;

use tracing::debug;

use super::catalog::Tone;
use super::clip::{decode_wav, Clip};
use crate::error::{HubError, Result};

/// Contract for playback primitives.
pub trait AudioBackend: Send + Sync + 'static {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Rate clips must be converted to before `play_clip`.
    fn output_sample_rate(&self) -> u32;

    /// Load the first decodable file among `sources`.
    ///
    /// # Errors
    /// `HubError::NoLoadableSource` when none of them decode.
    fn load(&self, sources: &[PathBuf]) -> Result<Clip> {
        let target = self.output_sample_rate();
        for path in sources {
            match decode_wav(path, target) {
                Ok(clip) => return Ok(clip),
                Err(e) => debug!(backend = self.name(), "skipping sound source: {e}"),
            }
        }
        Err(HubError::NoLoadableSource {
            tried: sources.len(),
        })
    }

    /// Play a decoded clip at `volume` ∈ [0, 1].
    fn play_clip(&self, clip: &Clip, volume: f32) -> Result<()>;

    /// Synthesize and play `tone` at `volume` ∈ [0, 1].
    fn play_tone(&self, tone: &Tone, volume: f32) -> Result<()>;
}

/// Backend for hosts without an audio device.
///
/// Every load fails and every play reports the device as unavailable, so the
/// engine exercises its fallback path and logs instead of making noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

const NULL_SAMPLE_RATE: u32 = 48_000;

impl AudioBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn output_sample_rate(&self) -> u32 {
        NULL_SAMPLE_RATE
    }

    fn load(&self, sources: &[PathBuf]) -> Result<Clip> {
        Err(HubError::NoLoadableSource {
            tried: sources.len(),
        })
    }

    fn play_clip(&self, _clip: &Clip, _volume: f32) -> Result<()> {
        Err(HubError::AudioUnavailable("no output device".into()))
    }

    fn play_tone(&self, _tone: &Tone, _volume: f32) -> Result<()> {
        Err(HubError::AudioUnavailable("no output device".into()))
    }
}
