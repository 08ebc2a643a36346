//! Decoded sound assets.

use std::path::Path;
use std::sync::Arc;

use hound::{SampleFormat, WavReader};

use super::resample::resample_clip;
use crate::error::{HubError, Result};

/// Mono PCM at a known sample rate, shared between the engine's sound table
/// and in-flight playback.
#[derive(Debug, Clone)]
pub struct Clip {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a WAV file, down-mix to mono and convert to `target_rate`.
///
/// # Errors
/// `HubError::AssetDecode` for unreadable, malformed or empty files.
pub fn decode_wav(path: &Path, target_rate: u32) -> Result<Clip> {
    let reader = WavReader::open(path)
        .map_err(|e| HubError::AssetDecode(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| HubError::AssetDecode(format!("{}: {e}", path.display())))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| HubError::AssetDecode(format!("{}: {e}", path.display())))?
        }
    };

    if interleaved.is_empty() {
        return Err(HubError::AssetDecode(format!(
            "{}: no samples",
            path.display()
        )));
    }

    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    let samples = resample_clip(&mono, spec.sample_rate, target_rate)?;
    Ok(Clip::new(samples, target_rate))
}
