//! Sound cue policy engine.
//!
//! ## Per-cue load state
//!
//! ```text
//! NotRequested ──schedule──► Loading ──► Loaded
//!                                   └──► LoadFailed
//! ```
//!
//! Preload cues are scheduled at construction; the rest on their first
//! `play`. A cue that is not `Loaded` when played falls back to its
//! synthesized tone, so playback never waits on a load.
//!
//! ## Failure policy
//!
//! Nothing in here returns an error to the caller. Decode, device and
//! settings-store failures are logged and absorbed; the user-visible effect
//! is silence.

pub mod backend;
pub mod catalog;
pub mod clip;
#[cfg(feature = "audio-cpal")]
pub mod output;
pub mod resample;
pub mod ring;
pub mod synth;

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use backend::{AudioBackend, NullBackend};
pub use catalog::{SoundAsset, SoundCatalog, SoundCue, Tone, Waveform, DEFAULT_TONE};
pub use clip::Clip;
#[cfg(feature = "audio-cpal")]
pub use output::CpalBackend;

use crate::bus::{payload_from_value, AppEvent, EventBus};
use crate::settings::{clamp_volume, SettingsStore, SoundSettings};

/// Public view of a cue's load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    NotRequested,
    Loading,
    Loaded,
    LoadFailed,
}

/// Where asset loads run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// On a short-lived loader thread per cue.
    #[default]
    Background,
    /// On the calling thread, before `schedule` returns. Deterministic; used
    /// by tests and tools.
    Inline,
}

#[derive(Debug, Clone)]
pub struct SoundEngineConfig {
    pub catalog: SoundCatalog,
    pub load_mode: LoadMode,
    /// Schedule preload cues at construction.
    pub preload: bool,
}

impl SoundEngineConfig {
    pub fn new(catalog: SoundCatalog) -> Self {
        Self {
            catalog,
            load_mode: LoadMode::default(),
            preload: true,
        }
    }
}

enum Slot {
    NotRequested,
    Loading,
    Loaded(LoadedSound),
    LoadFailed,
}

struct LoadedSound {
    clip: Arc<Clip>,
    /// Live playback volume: `base_volume × global volume`.
    volume: f32,
}

impl Slot {
    fn state(&self) -> LoadState {
        match self {
            Slot::NotRequested => LoadState::NotRequested,
            Slot::Loading => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
            Slot::LoadFailed => LoadState::LoadFailed,
        }
    }
}

#[derive(Default)]
pub struct SoundDiagnostics {
    pub clips_played: AtomicUsize,
    pub tones_synthesized: AtomicUsize,
    pub muted_skips: AtomicUsize,
    pub playback_failures: AtomicUsize,
    pub loads_failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundDiagnosticsSnapshot {
    pub clips_played: usize,
    pub tones_synthesized: usize,
    pub muted_skips: usize,
    pub playback_failures: usize,
    pub loads_failed: usize,
}

struct EngineInner {
    backend: Arc<dyn AudioBackend>,
    store: Arc<dyn SettingsStore>,
    catalog: SoundCatalog,
    load_mode: LoadMode,
    settings: Mutex<SoundSettings>,
    slots: Mutex<HashMap<SoundCue, Slot>>,
    bus: Mutex<Option<EventBus>>,
    diagnostics: SoundDiagnostics,
}

/// Shared sound engine handle. Clones share state.
#[derive(Clone)]
pub struct SoundEngine {
    inner: Arc<EngineInner>,
}

impl SoundEngine {
    /// Read persisted settings from `store` (defaults on any failure) and
    /// schedule preload cues when `config.preload` is set.
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        store: Arc<dyn SettingsStore>,
        config: SoundEngineConfig,
    ) -> Self {
        let settings = SoundSettings::load(store.as_ref());
        let slots = SoundCue::ALL
            .into_iter()
            .map(|cue| (cue, Slot::NotRequested))
            .collect();

        info!(
            backend = backend.name(),
            enabled = settings.enabled,
            volume = settings.volume,
            "sound engine ready"
        );

        let engine = Self {
            inner: Arc::new(EngineInner {
                backend,
                store,
                catalog: config.catalog,
                load_mode: config.load_mode,
                settings: Mutex::new(settings),
                slots: Mutex::new(slots),
                bus: Mutex::new(None),
                diagnostics: SoundDiagnostics::default(),
            }),
        };
        if config.preload {
            engine.preload();
        }
        engine
    }

    /// Publish `settings:sound:changed` on `bus` from now on.
    pub fn attach_bus(&self, bus: EventBus) {
        *self.inner.bus.lock() = Some(bus);
    }

    /// Schedule every preload cue that has not been requested yet.
    pub fn preload(&self) {
        for asset in self.inner.catalog.iter().filter(|a| a.preload) {
            if self.mark_loading(asset.cue) {
                self.schedule_load(asset.cue);
            }
        }
    }

    /// Play `cue`, or its fallback tone when the asset is not ready.
    pub fn play(&self, cue: SoundCue) {
        let settings = *self.inner.settings.lock();
        if !settings.enabled {
            self.inner
                .diagnostics
                .muted_skips
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut needs_load = false;
        let ready = {
            let mut slots = self.inner.slots.lock();
            match slots.get_mut(&cue) {
                Some(Slot::Loaded(sound)) => Some((Arc::clone(&sound.clip), sound.volume)),
                Some(slot @ Slot::NotRequested) => {
                    *slot = Slot::Loading;
                    needs_load = true;
                    None
                }
                _ => None,
            }
        };
        if needs_load {
            self.schedule_load(cue);
        }

        if let Some((clip, volume)) = ready {
            match self.inner.backend.play_clip(&clip, volume) {
                Ok(()) => {
                    self.inner
                        .diagnostics
                        .clips_played
                        .fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    warn!(cue = cue.as_str(), "clip playback failed, synthesizing: {e}");
                }
            }
        }

        let tone = self.inner.catalog.get(cue).fallback;
        self.synthesize(cue.as_str(), &tone, settings.volume);
    }

    /// Play a cue by wire name. Unknown names get [`DEFAULT_TONE`].
    pub fn play_named(&self, name: &str) {
        match name.parse::<SoundCue>() {
            Ok(cue) => self.play(cue),
            Err(()) => {
                let settings = *self.inner.settings.lock();
                if !settings.enabled {
                    self.inner
                        .diagnostics
                        .muted_skips
                        .fetch_add(1, Ordering::Relaxed);
                    return;
                }
                debug!(name, "unknown sound cue, playing default tone");
                self.synthesize(name, &DEFAULT_TONE, settings.volume);
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.settings.lock().enabled
    }

    pub fn volume(&self) -> f32 {
        self.inner.settings.lock().volume
    }

    pub fn settings(&self) -> SoundSettings {
        *self.inner.settings.lock()
    }

    /// Turn cues on or off. Turning them on plays a confirming click.
    pub fn set_enabled(&self, enabled: bool) {
        let (was_enabled, snapshot) = {
            let mut settings = self.inner.settings.lock();
            let was = settings.enabled;
            settings.enabled = enabled;
            (was, *settings)
        };
        self.persist(snapshot);
        if !was_enabled && enabled {
            self.play(SoundCue::Click);
        }
    }

    /// Set the global volume (clamped to [0, 1]) and rescale every loaded
    /// cue's live volume to `base_volume × v`.
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        let snapshot = {
            let mut settings = self.inner.settings.lock();
            settings.volume = volume;
            *settings
        };
        {
            let mut slots = self.inner.slots.lock();
            for (cue, slot) in slots.iter_mut() {
                if let Slot::Loaded(sound) = slot {
                    sound.volume = self.inner.catalog.get(*cue).base_volume * volume;
                }
            }
        }
        self.persist(snapshot);
        if snapshot.enabled && volume > 0.0 {
            self.play(SoundCue::Click);
        }
    }

    pub fn load_state(&self, cue: SoundCue) -> LoadState {
        self.inner
            .slots
            .lock()
            .get(&cue)
            .map_or(LoadState::NotRequested, Slot::state)
    }

    /// Live playback volume of a loaded cue; `None` until it is loaded.
    pub fn effective_volume(&self, cue: SoundCue) -> Option<f32> {
        match self.inner.slots.lock().get(&cue) {
            Some(Slot::Loaded(sound)) => Some(sound.volume),
            _ => None,
        }
    }

    pub fn diagnostics_snapshot(&self) -> SoundDiagnosticsSnapshot {
        let d = &self.inner.diagnostics;
        SoundDiagnosticsSnapshot {
            clips_played: d.clips_played.load(Ordering::Relaxed),
            tones_synthesized: d.tones_synthesized.load(Ordering::Relaxed),
            muted_skips: d.muted_skips.load(Ordering::Relaxed),
            playback_failures: d.playback_failures.load(Ordering::Relaxed),
            loads_failed: d.loads_failed.load(Ordering::Relaxed),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn synthesize(&self, label: &str, tone: &Tone, global_volume: f32) {
        let volume = tone.base_volume * global_volume;
        match self.inner.backend.play_tone(tone, volume) {
            Ok(()) => {
                self.inner
                    .diagnostics
                    .tones_synthesized
                    .fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.inner
                    .diagnostics
                    .playback_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(cue = label, "fallback tone unavailable, staying silent: {e}");
            }
        }
    }

    /// `NotRequested → Loading`. Returns `false` if the cue was already past
    /// `NotRequested`.
    fn mark_loading(&self, cue: SoundCue) -> bool {
        let mut slots = self.inner.slots.lock();
        match slots.get_mut(&cue) {
            Some(slot @ Slot::NotRequested) => {
                *slot = Slot::Loading;
                true
            }
            _ => false,
        }
    }

    fn schedule_load(&self, cue: SoundCue) {
        match self.inner.load_mode {
            LoadMode::Inline => load_into_slot(&self.inner, cue),
            LoadMode::Background => {
                let inner = Arc::clone(&self.inner);
                let spawned = std::thread::Builder::new()
                    .name(format!("sound-load-{cue}"))
                    .spawn(move || load_into_slot(&inner, cue));
                if let Err(e) = spawned {
                    warn!(cue = cue.as_str(), "could not spawn loader, loading inline: {e}");
                    load_into_slot(&self.inner, cue);
                }
            }
        }
    }

    fn persist(&self, settings: SoundSettings) {
        if let Err(e) = settings.save(self.inner.store.as_ref()) {
            warn!("sound settings not persisted, keeping in-memory values: {e}");
        }
        let bus = self.inner.bus.lock().clone();
        if let Some(bus) = bus {
            let payload = serde_json::to_value(settings)
                .ok()
                .and_then(payload_from_value);
            bus.emit(AppEvent::SoundSettingsChanged, payload.as_ref());
        }
    }
}

fn load_into_slot(inner: &EngineInner, cue: SoundCue) {
    let asset = inner.catalog.get(cue);
    let result = inner.backend.load(&asset.sources);

    // Read the volume under the slot lock so a concurrent `set_volume`
    // either sees this entry or has already published its value.
    let mut slots = inner.slots.lock();
    let global_volume = inner.settings.lock().volume;
    let slot = match result {
        Ok(clip) => {
            debug!(
                cue = cue.as_str(),
                secs = clip.duration_secs(),
                "sound asset loaded"
            );
            Slot::Loaded(LoadedSound {
                clip: Arc::new(clip),
                volume: asset.base_volume * global_volume,
            })
        }
        Err(e) => {
            inner.diagnostics.loads_failed.fetch_add(1, Ordering::Relaxed);
            warn!(cue = cue.as_str(), "sound asset unavailable, tone fallback: {e}");
            Slot::LoadFailed
        }
    };
    slots.insert(cue, slot);
}

impl std::fmt::Debug for SoundEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundEngine")
            .field("backend", &self.inner.backend.name())
            .field("settings", &*self.inner.settings.lock())
            .finish_non_exhaustive()
    }
}
