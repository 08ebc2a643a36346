//! GuardHub host process.
//!
//! Wires the core services together and drives them from a line-oriented
//! console standing in for the UI layer.

mod commands;
mod ledger;
mod settings;
mod state;

use std::sync::Arc;
use std::time::Duration;

use guardhub_core::settings::{JsonFileStore, SettingsStore};
use guardhub_core::sound::{
    AudioBackend, LoadMode, NullBackend, SoundCatalog, SoundEngine, SoundEngineConfig,
};
use guardhub_core::{EventBus, Services, SoundCue, ToastCenter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use commands::Outcome;
use ledger::Ledger;
use settings::{
    apply_env_overrides, audio_disabled_by_env, default_data_dir, default_settings_path,
    load_settings,
};
use state::AppState;

/// Simulated ledger round trip.
const LEDGER_LATENCY: Duration = Duration::from_millis(150);

fn open_backend() -> Arc<dyn AudioBackend> {
    if audio_disabled_by_env() {
        info!("audio disabled by GUARDHUB_AUDIO");
        return Arc::new(NullBackend);
    }
    match guardhub_core::CpalBackend::open_default() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!("no audio output, sound cues will be silent: {e}");
            Arc::new(NullBackend)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guardhub=info,guardhub_core=info".into()),
        )
        .init();

    info!("GuardHub starting");

    // ── Settings ──────────────────────────────────────────────────────────
    let data_dir = default_data_dir();
    let settings_path = default_settings_path();
    // `saved` is what `set` writes back; env overrides only apply to this run.
    let saved = load_settings(&settings_path);
    let mut app_settings = saved.clone();
    apply_env_overrides(&mut app_settings);
    info!(path = %settings_path.display(), "settings loaded");

    // ── Core services ─────────────────────────────────────────────────────
    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::new(data_dir.join("prefs")));
    let backend = open_backend();
    let config = SoundEngineConfig {
        catalog: SoundCatalog::with_assets_dir(&app_settings.assets_dir(&data_dir)),
        load_mode: LoadMode::Background,
        preload: app_settings.preload_sounds,
    };
    let sound = SoundEngine::new(backend, store, config);
    let toasts = Arc::new(ToastCenter::default());
    let services = Services::new(
        EventBus::new(),
        sound,
        toasts.clone(),
        Some(app_settings.toast_duration()),
    );

    let state = AppState::new(
        services,
        toasts,
        Arc::new(Ledger::new(LEDGER_LATENCY)),
        saved,
        settings_path,
    );
    state.start();
    state.services.sound.play(SoundCue::Welcome);

    // ── Console ───────────────────────────────────────────────────────────
    println!("GuardHub console. Type 'help' for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e:#}");
                continue;
            }
        };
        match commands::execute(&state, command).await {
            Ok(Outcome::Continue(output)) => println!("{output}"),
            Ok(Outcome::Quit) => break,
            Err(e) => println!("error: {e:#}"),
        }
    }

    state.shutdown();
    info!("GuardHub stopped");
    Ok(())
}
