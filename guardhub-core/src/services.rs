//! The application context handed to every hook and listener.
//!
//! One `Services` per process (or per test). Nothing in the crate reaches
//! for a global: whoever needs the bus, the sound engine or the refresh
//! counter gets them from here.

use std::sync::Arc;
use std::time::Duration;

use crate::bus::EventBus;
use crate::notify::{Notifier, ToastCenter, ToastSurface};
use crate::request::RefreshCounter;
use crate::settings::{MemoryStore, SettingsStore};
use crate::sound::{AudioBackend, LoadMode, NullBackend, SoundCatalog, SoundEngine, SoundEngineConfig};

#[derive(Clone, Debug)]
pub struct Services {
    pub bus: EventBus,
    pub sound: SoundEngine,
    pub notifier: Notifier,
    pub refresh: RefreshCounter,
}

impl Services {
    /// Wire the pieces together. The sound engine starts publishing
    /// `settings:sound:changed` on `bus`.
    pub fn new(
        bus: EventBus,
        sound: SoundEngine,
        surface: Arc<dyn ToastSurface>,
        toast_duration: Option<Duration>,
    ) -> Self {
        sound.attach_bus(bus.clone());
        let notifier = Notifier::new(sound.clone(), surface, toast_duration);
        Self {
            bus,
            sound,
            notifier,
            refresh: RefreshCounter::new(),
        }
    }

    /// Silent audio, in-memory settings, an in-process toast list and no
    /// auto-dismiss. Returns the toast list alongside so callers can read it.
    pub fn headless() -> (Self, Arc<ToastCenter>) {
        let backend: Arc<dyn AudioBackend> = Arc::new(NullBackend);
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let config = SoundEngineConfig {
            catalog: SoundCatalog::from_assets(Vec::new()),
            load_mode: LoadMode::Inline,
            preload: false,
        };
        let sound = SoundEngine::new(backend, store, config);
        let center = Arc::new(ToastCenter::default());
        let services = Self::new(EventBus::new(), sound, center.clone(), None);
        (services, center)
    }
}
