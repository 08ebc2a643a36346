//! Audio output via the cpal backend.
//!
//! # Threading
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS), so one dedicated thread opens the device, owns the stream and
//! parks on a control channel until shutdown. Callers never touch the
//! stream: they render cues into mono samples and push them into an SPSC
//! ring buffer that the output callback drains.
//!
//! # Callback contract
//!
//! The output callback runs at elevated priority. It does not block and
//! does no I/O; when the ring is empty it writes silence.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, StreamConfig, SupportedBufferSize,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::backend::AudioBackend;
use super::catalog::Tone;
use super::clip::Clip;
use super::ring::{create_output_ring, OutputConsumer, OutputProducer, Producer};
use super::synth::render_tone;
use crate::error::{HubError, Result};

/// Scratch size, in frames, when the device reports no buffer range.
const DEFAULT_SCRATCH_FRAMES: usize = 4096;
/// Upper bound on the scratch buffer; larger callbacks are filled in blocks.
const MAX_SCRATCH_FRAMES: usize = 16_384;

/// How long `open_default` waits for the output thread to report back.
const OPEN_TIMEOUT: Duration = Duration::from_secs(2);

enum Control {
    Shutdown,
}

/// Plays cues on the system default output device.
pub struct CpalBackend {
    producer: Mutex<OutputProducer>,
    sample_rate: u32,
    control: Sender<Control>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalBackend {
    /// Open the default output device on a dedicated thread.
    ///
    /// # Errors
    /// `HubError::NoDefaultOutputDevice` when the host has no output, or
    /// `HubError::AudioStream` if cpal fails to build or start the stream.
    pub fn open_default() -> Result<Self> {
        let (producer, consumer) = create_output_ring();
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (control_tx, control_rx) = bounded::<Control>(1);
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = Arc::clone(&running);

        let thread = std::thread::Builder::new()
            .name("guardhub-audio-out".into())
            .spawn(move || {
                let stream = match open_stream(consumer, Arc::clone(&running_thread)) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                park_until_shutdown(&control_rx);
                running_thread.store(false, Ordering::Release);
                // Stream drops here, releasing the device on this thread.
                drop(stream);
            })?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(sample_rate)) => Ok(Self {
                producer: Mutex::new(producer),
                sample_rate,
                control: control_tx,
                running,
                thread: Mutex::new(Some(thread)),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::Release);
                let _ = control_tx.send(Control::Shutdown);
                Err(HubError::AudioStream(
                    "output thread did not report in time".into(),
                ))
            }
        }
    }

    fn enqueue(&self, samples: &[f32]) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(HubError::AudioUnavailable("output stream stopped".into()));
        }
        let written = self.producer.lock().push_slice(samples);
        if written < samples.len() {
            warn!(
                dropped = samples.len() - written,
                "output ring full: cue truncated"
            );
        }
        Ok(())
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn output_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play_clip(&self, clip: &Clip, volume: f32) -> Result<()> {
        if clip.sample_rate != self.sample_rate {
            return Err(HubError::AudioStream(format!(
                "clip rate {} does not match output rate {}",
                clip.sample_rate, self.sample_rate
            )));
        }
        let scaled: Vec<f32> = clip.samples.iter().map(|s| s * volume).collect();
        self.enqueue(&scaled)
    }

    fn play_tone(&self, tone: &Tone, volume: f32) -> Result<()> {
        self.enqueue(&render_tone(tone, volume, self.sample_rate))
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn park_until_shutdown(control: &Receiver<Control>) {
    // A disconnected channel means the backend was dropped without a message.
    while let Ok(msg) = control.recv() {
        match msg {
            Control::Shutdown => break,
        }
    }
}

fn open_stream(
    mut consumer: OutputConsumer,
    running: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(HubError::NoDefaultOutputDevice)?;

    info!(
        device = device.name().unwrap_or_default().as_str(),
        "opening output device"
    );

    let supported = device
        .default_output_config()
        .map_err(|e| HubError::AudioDevice(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: StreamConfig = supported.config();

    info!(sample_rate, channels, "output config selected");

    let err_fn = |err| error!("audio output stream error: {err}");
    // Sized once here; the callback never allocates.
    let mut mono = vec![0.0f32; scratch_frames(supported.buffer_size())];

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |out: &mut [f32], _| {
                fill_frames(out, channels, &mut consumer, &mut mono, &running, |s| s)
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |out: &mut [i16], _| {
                fill_frames(out, channels, &mut consumer, &mut mono, &running, |s| {
                    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                })
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            &config,
            move |out: &mut [u16], _| {
                fill_frames(out, channels, &mut consumer, &mut mono, &running, |s| {
                    ((s.clamp(-1.0, 1.0) * 0.5 + 0.5) * u16::MAX as f32) as u16
                })
            },
            err_fn,
            None,
        ),
        fmt => {
            return Err(HubError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| HubError::AudioStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| HubError::AudioStream(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// Frames of mono scratch to allocate for a device's buffer range.
fn scratch_frames(buffer_size: &SupportedBufferSize) -> usize {
    match buffer_size {
        SupportedBufferSize::Range { max, .. } => (*max as usize).clamp(256, MAX_SCRATCH_FRAMES),
        SupportedBufferSize::Unknown => DEFAULT_SCRATCH_FRAMES,
    }
}

/// Drain mono samples from the ring and fan each one out to every channel.
///
/// `mono` is fixed-size scratch; callbacks longer than it are filled in
/// blocks.
fn fill_frames<T: Copy>(
    out: &mut [T],
    channels: usize,
    consumer: &mut OutputConsumer,
    mono: &mut [f32],
    running: &AtomicBool,
    convert: impl Fn(f32) -> T,
) {
    use super::ring::Consumer;

    let channels = channels.max(1);
    if mono.is_empty() {
        return;
    }
    let live = running.load(Ordering::Relaxed);

    for block in out.chunks_mut(mono.len() * channels) {
        let frames = block.len() / channels;
        let scratch = &mut mono[..frames];
        let got = if live { consumer.pop_slice(scratch) } else { 0 };
        scratch[got..].fill(0.0);

        for (frame, sample) in block.chunks_exact_mut(channels).zip(scratch.iter()) {
            frame.fill(convert(*sample));
        }
    }
}
