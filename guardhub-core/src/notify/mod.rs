//! Toast notifications coupled to sound cues.
//!
//! `Notifier::notify` does three things, in order:
//! 1. play the cue for the severity (fixed table, see [`Severity::cue`]),
//! 2. show the toast on the [`ToastSurface`],
//! 3. schedule auto-dismiss when a duration applies.
//!
//! The returned [`ToastHandle`] can always dismiss or update the toast.

pub mod center;
pub mod report;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub use center::{ToastCenter, ToastEvent};
pub use report::{describe_chain, describe_error};

use crate::request::RequestError;
use crate::sound::{SoundCue, SoundEngine};

pub type ToastId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Cue policy. Not configurable per call site so every screen sounds the
    /// same for the same outcome.
    pub const fn cue(self) -> SoundCue {
        match self {
            Severity::Success => SoundCue::Success,
            Severity::Error => SoundCue::Error,
            Severity::Warning | Severity::Info => SoundCue::Notification,
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Severity::Success),
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// What to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    /// `None` uses the notifier default; `Some(0)` keeps the toast until it
    /// is dismissed by hand.
    pub duration_ms: Option<u64>,
}

impl NotifyRequest {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            severity,
            duration_ms: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn sticky(self) -> Self {
        self.duration_ms(0)
    }
}

/// Partial update applied by [`ToastHandle::update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToastPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
}

/// Where toasts are rendered. The notifier does not own rendering.
pub trait ToastSurface: Send + Sync + 'static {
    fn show(&self, request: &NotifyRequest) -> ToastId;

    /// Returns `false` when `id` is no longer shown.
    fn update(&self, id: ToastId, patch: &ToastPatch) -> bool;

    /// Returns `false` when `id` is no longer shown.
    fn dismiss(&self, id: ToastId) -> bool;
}

/// Handle to one shown toast.
#[derive(Clone)]
pub struct ToastHandle {
    id: ToastId,
    surface: Arc<dyn ToastSurface>,
}

impl ToastHandle {
    pub fn id(&self) -> ToastId {
        self.id
    }

    pub fn dismiss(&self) -> bool {
        self.surface.dismiss(self.id)
    }

    pub fn update(&self, patch: ToastPatch) -> bool {
        self.surface.update(self.id, &patch)
    }
}

impl std::fmt::Debug for ToastHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToastHandle").field("id", &self.id).finish()
    }
}

/// Sound + toast composition.
#[derive(Clone)]
pub struct Notifier {
    sound: SoundEngine,
    surface: Arc<dyn ToastSurface>,
    default_duration: Option<Duration>,
}

impl Notifier {
    pub fn new(
        sound: SoundEngine,
        surface: Arc<dyn ToastSurface>,
        default_duration: Option<Duration>,
    ) -> Self {
        Self {
            sound,
            surface,
            default_duration,
        }
    }

    pub fn sound(&self) -> &SoundEngine {
        &self.sound
    }

    pub fn notify(&self, request: NotifyRequest) -> ToastHandle {
        self.sound.play(request.severity.cue());

        let id = self.surface.show(&request);
        let duration = match request.duration_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => self.default_duration,
        };
        if let Some(after) = duration {
            schedule_dismiss(Arc::clone(&self.surface), id, after);
        }

        debug!(
            toast = id,
            severity = ?request.severity,
            title = request.title.as_str(),
            "toast shown"
        );
        ToastHandle {
            id,
            surface: Arc::clone(&self.surface),
        }
    }

    pub fn success(&self, title: impl Into<String>, description: Option<String>) -> ToastHandle {
        self.notify(with_description(NotifyRequest::new(Severity::Success, title), description))
    }

    pub fn error(&self, title: impl Into<String>, description: Option<String>) -> ToastHandle {
        self.notify(with_description(NotifyRequest::new(Severity::Error, title), description))
    }

    pub fn warning(&self, title: impl Into<String>, description: Option<String>) -> ToastHandle {
        self.notify(with_description(NotifyRequest::new(Severity::Warning, title), description))
    }

    pub fn info(&self, title: impl Into<String>, description: Option<String>) -> ToastHandle {
        self.notify(with_description(NotifyRequest::new(Severity::Info, title), description))
    }

    /// The shared failure path: log the full error chain, toast a readable
    /// one.
    pub fn report_error(&self, title: &str, err: &RequestError) -> ToastHandle {
        error!(title, error = %err, "operation failed");
        self.error(title, Some(describe_chain(err.messages().as_slice())))
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("default_duration", &self.default_duration)
            .finish_non_exhaustive()
    }
}

fn with_description(request: NotifyRequest, description: Option<String>) -> NotifyRequest {
    match description {
        Some(d) => request.description(d),
        None => request,
    }
}

fn schedule_dismiss(surface: Arc<dyn ToastSurface>, id: ToastId, after: Duration) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            surface.dismiss(id);
        });
        return;
    }

    let spawned = std::thread::Builder::new()
        .name("toast-dismiss".into())
        .spawn(move || {
            std::thread::sleep(after);
            surface.dismiss(id);
        });
    if let Err(e) = spawned {
        warn!(toast = id, "auto-dismiss not scheduled: {e}");
    }
}
