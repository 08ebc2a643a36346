//! # guardhub-core
//!
//! Cross-screen plumbing for the GuardHub ERP: event bus, sound/toast
//! notification policy, and the query/mutation request layer.
//!
//! ## Architecture
//!
//! ```text
//! MutationHook::mutate ──► state: Loading → Success/Error
//!        │                        │
//!        │ success                └─ error ──► Notifier::report_error ──► toast + error cue
//!        ▼
//!  Notifier::success ──► SoundEngine::play(success) + toast
//!  RefreshCounter::trigger ──► broadcast ──► QueryHook watch loops re-fetch
//!  EventBus::emit(domain event) ──► subscribers (registration order, panic-isolated)
//! ```
//!
//! Everything hangs off one [`Services`] value built by the host. There are
//! no globals, so tests build their own isolated instances.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod bus;
pub mod error;
pub mod notify;
pub mod request;
pub mod services;
pub mod settings;
pub mod sound;

// Convenience re-exports for downstream crates
pub use bus::{AppEvent, EventBus, Payload, Subscription};
pub use error::{HubError, Result};
pub use notify::{NotifyRequest, Notifier, Severity, ToastCenter, ToastHandle, ToastSurface};
pub use request::{
    BatchMutationHook, MutationHook, MutationOptions, QueryHook, QueryOptions, QueryWatch,
    RefreshCounter, RequestError, RequestState, RequestStatus,
};
pub use services::Services;
pub use settings::{JsonFileStore, MemoryStore, SettingsStore, SoundSettings};
pub use sound::{SoundCatalog, SoundCue, SoundEngine, SoundEngineConfig};

#[cfg(feature = "audio-cpal")]
pub use sound::CpalBackend;
