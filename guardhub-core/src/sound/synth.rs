//! Oscillator used when a cue has no playable asset.
//!
//! ## Envelope
//!
//! ```text
//! amp ▲   ┌──────────────┐
//!     │  /                \
//!     │ /                  \__
//!     └─────────────────────────► t
//!      5 ms attack     release over the last 30 %
//! ```
//!
//! The short attack and the release ramp keep the tone free of clicks at
//! the start and end of the buffer.

use std::f32::consts::TAU;

use super::catalog::{Tone, Waveform};

const ATTACK_MS: f32 = 5.0;
const RELEASE_FRACTION: f32 = 0.3;

/// Render `tone` as mono f32 samples at `sample_rate`, scaled by `volume`.
pub fn render_tone(tone: &Tone, volume: f32, sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate as u64 * tone.duration_ms as u64 / 1000) as usize;
    if total == 0 || tone.frequency <= 0.0 || volume <= 0.0 {
        return vec![0.0; total];
    }

    let sr = sample_rate as f32;
    let attack = ((ATTACK_MS / 1000.0) * sr).max(1.0) as usize;
    let release = ((total as f32 * RELEASE_FRACTION) as usize).max(1);
    let release_start = total.saturating_sub(release);
    let step = tone.frequency / sr;

    let mut phase = 0f32;
    let mut out = Vec::with_capacity(total);
    for i in 0..total {
        let sample = oscillate(tone.waveform, phase);
        phase = (phase + step).fract();

        let env = if i < attack {
            i as f32 / attack as f32
        } else if i >= release_start {
            let r = (total - i) as f32 / release as f32;
            r * r
        } else {
            1.0
        };
        out.push(sample * env * volume);
    }
    out
}

/// One sample of `waveform` at `phase` ∈ [0, 1).
fn oscillate(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (phase * TAU).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Sawtooth => 2.0 * phase - 1.0,
    }
}
