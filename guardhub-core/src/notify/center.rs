//! In-process toast list.
//!
//! Holds the toasts currently on screen and broadcasts every change so a
//! renderer (or a test) can follow along.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use super::{NotifyRequest, Severity, ToastId, ToastPatch, ToastSurface};

/// At most this many toasts are visible; showing another evicts the oldest.
pub const DEFAULT_VISIBLE_LIMIT: usize = 5;

const EVENT_CAP: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: ToastId,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToastEvent {
    Shown { toast: Toast },
    Updated { toast: Toast },
    Dismissed { id: ToastId },
}

pub struct ToastCenter {
    toasts: Mutex<Vec<Toast>>,
    next_id: AtomicU64,
    limit: usize,
    events_tx: broadcast::Sender<ToastEvent>,
}

impl ToastCenter {
    pub fn new(limit: usize) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAP);
        Self {
            toasts: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            limit: limit.max(1),
            events_tx,
        }
    }

    /// Oldest first.
    pub fn active(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToastEvent> {
        self.events_tx.subscribe()
    }

    fn publish(&self, event: ToastEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }
}

impl Default for ToastCenter {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBLE_LIMIT)
    }
}

impl ToastSurface for ToastCenter {
    fn show(&self, request: &NotifyRequest) -> ToastId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let toast = Toast {
            id,
            title: request.title.clone(),
            description: request.description.clone(),
            severity: request.severity,
            created_at: Utc::now(),
        };

        let evicted: Vec<ToastId> = {
            let mut toasts = self.toasts.lock();
            toasts.push(toast.clone());
            let overflow = toasts.len().saturating_sub(self.limit);
            toasts.drain(..overflow).map(|t| t.id).collect()
        };
        for id in evicted {
            self.publish(ToastEvent::Dismissed { id });
        }
        self.publish(ToastEvent::Shown { toast });
        id
    }

    fn update(&self, id: ToastId, patch: &ToastPatch) -> bool {
        let updated = {
            let mut toasts = self.toasts.lock();
            let Some(toast) = toasts.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            if let Some(title) = &patch.title {
                toast.title = title.clone();
            }
            if let Some(description) = &patch.description {
                toast.description = Some(description.clone());
            }
            if let Some(severity) = patch.severity {
                toast.severity = severity;
            }
            toast.clone()
        };
        self.publish(ToastEvent::Updated { toast: updated });
        true
    }

    fn dismiss(&self, id: ToastId) -> bool {
        let removed = {
            let mut toasts = self.toasts.lock();
            let before = toasts.len();
            toasts.retain(|t| t.id != id);
            toasts.len() != before
        };
        if removed {
            self.publish(ToastEvent::Dismissed { id });
        }
        removed
    }
}
