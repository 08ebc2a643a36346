use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use guardhub_core::error::{HubError, Result};
use guardhub_core::settings::SOUND_SETTINGS_KEY;
use guardhub_core::sound::{
    AudioBackend, Clip, LoadMode, LoadState, SoundCatalog, SoundCue, SoundEngine,
    SoundEngineConfig, Tone, DEFAULT_TONE,
};
use guardhub_core::{
    AppEvent, EventBus, JsonFileStore, MemoryStore, Payload, Services, SettingsStore, Severity,
    ToastCenter,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Played {
    Clip { volume: f32 },
    Tone { frequency: f32, volume: f32 },
}

/// Records every playback. Loads succeed unless `fail_loads` is set.
#[derive(Default)]
struct RecordingBackend {
    fail_loads: bool,
    played: Mutex<Vec<Played>>,
}

impl RecordingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail_loads: true,
            ..Self::default()
        })
    }

    fn take(&self) -> Vec<Played> {
        std::mem::take(&mut *self.played.lock())
    }
}

impl AudioBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn output_sample_rate(&self) -> u32 {
        48_000
    }

    fn load(&self, sources: &[PathBuf]) -> Result<Clip> {
        if self.fail_loads || sources.is_empty() {
            return Err(HubError::NoLoadableSource {
                tried: sources.len(),
            });
        }
        Ok(Clip::new(vec![0.0; 480], 48_000))
    }

    fn play_clip(&self, _clip: &Clip, volume: f32) -> Result<()> {
        self.played.lock().push(Played::Clip { volume });
        Ok(())
    }

    fn play_tone(&self, tone: &Tone, volume: f32) -> Result<()> {
        self.played.lock().push(Played::Tone {
            frequency: tone.frequency,
            volume,
        });
        Ok(())
    }
}

/// Settings store whose writes always fail.
struct ReadOnlyStore;

impl SettingsStore for ReadOnlyStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, key: &str, _value: &str) -> Result<()> {
        Err(HubError::Storage(format!("{key}: quota exceeded")))
    }
}

fn catalog() -> SoundCatalog {
    SoundCatalog::with_assets_dir(Path::new("assets"))
}

fn engine_with(backend: Arc<RecordingBackend>, store: Arc<dyn SettingsStore>) -> SoundEngine {
    let config = SoundEngineConfig {
        catalog: catalog(),
        load_mode: LoadMode::Inline,
        preload: true,
    };
    SoundEngine::new(backend, store, config)
}

fn engine(backend: Arc<RecordingBackend>) -> SoundEngine {
    engine_with(backend, Arc::new(MemoryStore::new()))
}

#[test]
fn muted_engine_is_silent_for_every_cue_and_unknown_names() {
    let backend = RecordingBackend::new();
    let engine = engine(backend.clone());
    engine.set_enabled(false);
    backend.take();

    for cue in SoundCue::ALL {
        engine.play(cue);
    }
    engine.play_named("no-such-cue");

    assert!(backend.take().is_empty());
    let diag = engine.diagnostics_snapshot();
    assert_eq!(diag.muted_skips, SoundCue::ALL.len() + 1);
    assert_eq!(diag.clips_played, 0);
    assert_eq!(diag.tones_synthesized, 0);
}

#[test]
fn loaded_cue_volume_is_base_times_global() {
    let backend = RecordingBackend::new();
    let engine = engine(backend.clone());
    let base = catalog().get(SoundCue::Success).base_volume;
    assert_eq!(engine.load_state(SoundCue::Success), LoadState::Loaded);

    engine.set_volume(0.5);
    assert_relative_eq!(engine.effective_volume(SoundCue::Success).unwrap(), base * 0.5);

    engine.set_volume(1.5);
    assert_relative_eq!(engine.volume(), 1.0);
    assert_relative_eq!(engine.effective_volume(SoundCue::Success).unwrap(), base);

    backend.take();
    engine.play(SoundCue::Success);
    match backend.take().as_slice() {
        [Played::Clip { volume }] => assert_relative_eq!(*volume, base),
        other => panic!("expected one clip, got {other:?}"),
    }

    engine.set_volume(-3.0);
    assert_relative_eq!(engine.volume(), 0.0);
    assert_relative_eq!(engine.effective_volume(SoundCue::Success).unwrap(), 0.0);
}

#[test]
fn volume_change_confirms_with_a_click_only_when_audible() {
    let backend = RecordingBackend::new();
    let engine = engine(backend.clone());
    backend.take();

    engine.set_volume(0.8);
    assert_eq!(backend.take().len(), 1, "click after raising volume");

    engine.set_volume(0.0);
    assert!(backend.take().is_empty(), "no click at zero volume");

    engine.set_enabled(false);
    engine.set_volume(0.5);
    assert!(backend.take().is_empty(), "no click while muted");

    engine.set_enabled(true);
    assert_eq!(backend.take().len(), 1, "click when re-enabled");
}

#[test]
fn failed_assets_fall_back_to_their_tone_for_every_cue() {
    let backend = RecordingBackend::broken();
    let engine = engine(backend.clone());
    let catalog = catalog();
    let volume = engine.volume();

    for cue in SoundCue::ALL {
        engine.play(cue);
        assert_eq!(engine.load_state(cue), LoadState::LoadFailed, "{cue}");

        let fallback = catalog.get(cue).fallback;
        match backend.take().as_slice() {
            [Played::Tone { frequency, volume: v }] => {
                assert_relative_eq!(*frequency, fallback.frequency);
                assert_relative_eq!(*v, fallback.base_volume * volume);
            }
            other => panic!("{cue}: expected one tone, got {other:?}"),
        }
    }

    engine.play_named("definitely-not-a-cue");
    match backend.take().as_slice() {
        [Played::Tone { frequency, .. }] => assert_relative_eq!(*frequency, DEFAULT_TONE.frequency),
        other => panic!("expected the default tone, got {other:?}"),
    }
    assert_eq!(engine.diagnostics_snapshot().loads_failed, SoundCue::ALL.len());
}

#[test]
fn lazy_cue_loads_on_first_play() {
    let backend = RecordingBackend::new();
    let engine = engine(backend.clone());
    backend.take();

    assert_eq!(engine.load_state(SoundCue::Delete), LoadState::NotRequested);
    assert_eq!(engine.effective_volume(SoundCue::Delete), None);

    engine.play(SoundCue::Delete);
    assert!(matches!(backend.take().as_slice(), [Played::Tone { .. }]));
    assert_eq!(engine.load_state(SoundCue::Delete), LoadState::Loaded);

    engine.play(SoundCue::Delete);
    assert!(matches!(backend.take().as_slice(), [Played::Clip { .. }]));
}

#[test]
fn background_loads_finish_on_their_own() {
    let backend = RecordingBackend::new();
    let config = SoundEngineConfig::new(catalog());
    let engine = SoundEngine::new(backend, Arc::new(MemoryStore::new()), config);

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while engine.load_state(SoundCue::Welcome) != LoadState::Loaded {
        assert!(std::time::Instant::now() < deadline, "welcome never loaded");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(engine.load_state(SoundCue::Download), LoadState::NotRequested);
}

#[test]
fn settings_survive_a_fresh_engine() {
    let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
    let first = engine_with(RecordingBackend::new(), store.clone());
    first.set_enabled(false);
    first.set_volume(0.7);

    let second = engine_with(RecordingBackend::new(), store);
    assert!(!second.is_enabled());
    assert_relative_eq!(second.volume(), 0.7);
}

#[test]
fn file_store_round_trip_clamps_volume() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::new(dir.path().join("prefs")));

    let first = engine_with(RecordingBackend::new(), store.clone());
    first.set_volume(3.0);
    first.set_enabled(true);

    let second = engine_with(RecordingBackend::new(), store);
    assert!(second.is_enabled());
    assert_relative_eq!(second.volume(), 1.0);
}

#[test]
fn corrupt_settings_fall_back_to_defaults() {
    let store = Arc::new(MemoryStore::new());
    store.set(SOUND_SETTINGS_KEY, "{not json").unwrap();

    let engine = engine_with(RecordingBackend::new(), store);
    assert!(engine.is_enabled());
    assert_relative_eq!(engine.volume(), 0.4);
}

#[test]
fn unwritable_store_keeps_in_memory_values() {
    let engine = engine_with(RecordingBackend::new(), Arc::new(ReadOnlyStore));
    engine.set_volume(0.9);
    engine.set_enabled(false);

    assert_relative_eq!(engine.volume(), 0.9);
    assert!(!engine.is_enabled());
}

#[test]
fn settings_changes_are_published_on_the_bus() {
    let bus = EventBus::new();
    let engine = engine(RecordingBackend::new());
    engine.attach_bus(bus.clone());

    let seen: Arc<Mutex<Vec<Payload>>> = Arc::default();
    let sink = seen.clone();
    let _sub = bus.subscribe(AppEvent::SoundSettingsChanged, move |payload| {
        sink.lock().extend(payload.cloned());
    });

    engine.set_volume(0.25);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["enabled"], serde_json::json!(true));
    assert_eq!(seen[0]["volume"], serde_json::json!(0.25));
}

#[test]
fn notifier_plays_the_cue_for_each_severity() {
    let backend = RecordingBackend::broken();
    let engine = engine(backend.clone());
    let center = Arc::new(ToastCenter::default());
    let services = Services::new(EventBus::new(), engine, center.clone(), None);
    let catalog = catalog();
    backend.take();

    let cases = [
        (Severity::Success, SoundCue::Success),
        (Severity::Error, SoundCue::Error),
        (Severity::Warning, SoundCue::Notification),
        (Severity::Info, SoundCue::Notification),
    ];
    for (severity, cue) in cases {
        services
            .notifier
            .notify(guardhub_core::NotifyRequest::new(severity, "Saved"));
        match backend.take().as_slice() {
            [Played::Tone { frequency, .. }] => {
                assert_relative_eq!(*frequency, catalog.get(cue).fallback.frequency)
            }
            other => panic!("{severity:?}: expected one tone, got {other:?}"),
        }
    }
    assert_eq!(center.active().len(), cases.len());
}
