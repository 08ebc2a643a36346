//! Sample-rate conversion for decoded sound assets using a rubato
//! `FastFixedIn` resampler.
//!
//! Asset files are authored at whatever rate their tool exported (commonly
//! 44.1 kHz) while the output device runs at its own native rate (commonly
//! 48 kHz). Clips are converted once, at load time, off the audio thread.
//!
//! When the rates already match, `RateConverter` is a passthrough and no
//! rubato session is created.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{HubError, Result};

/// Input frames per rubato call.
const CHUNK_SIZE: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input chunks between calls.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `HubError::AssetDecode` if rubato rejects the ratio.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| HubError::AssetDecode(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples accumulate until a full `chunk_size` block is available; any
    /// remainder waits for the next call or [`RateConverter::finish`].
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
            self.input_buf.drain(..self.chunk_size);
        }

        result
    }

    /// Flush the tail by zero-padding it to a full chunk.
    pub fn finish(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            return Vec::new();
        }
        let pad = self.chunk_size - self.input_buf.len();
        self.process(&vec![0.0; pad])
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Convert a whole clip in one go.
pub fn resample_clip(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    let mut rc = RateConverter::new(source_rate, target_rate, CHUNK_SIZE)?;
    let mut out = rc.process(samples);
    out.extend(rc.finish());
    Ok(out)
}
