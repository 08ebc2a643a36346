//! In-process publish/subscribe bus.
//!
//! ## Delivery
//!
//! ```text
//! emit(event, payload)
//!     └─► snapshot subscribers for `event` (registry lock held only here)
//!         └─► invoke each callback in registration order
//!             └─► a panicking callback is caught, logged, and skipped
//! ```
//!
//! Delivery is synchronous on the emitter's thread. Nothing is queued,
//! persisted or replayed: a subscriber registered after `emit` returns never
//! sees that event. Callbacks may subscribe, unsubscribe or emit from inside
//! a delivery because the registry lock is released before invocation.

pub mod events;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Weak,
};

use parking_lot::Mutex;
use tracing::{debug, error};

pub use events::{payload_from_value, AppEvent, Payload, UnknownEvent};

/// A subscriber callback. Shared so the same instance can be registered under
/// several events and later removed by identity.
pub type Callback = Arc<dyn Fn(Option<&Payload>) + Send + Sync>;

struct Entry {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    registry: Mutex<HashMap<AppEvent, Vec<Entry>>>,
    next_id: AtomicU64,
    diagnostics: BusDiagnostics,
}

/// Counters for observability.
#[derive(Default)]
pub struct BusDiagnostics {
    pub emitted: AtomicUsize,
    pub delivered: AtomicUsize,
    pub subscriber_panics: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusDiagnosticsSnapshot {
    pub emitted: usize,
    pub delivered: usize,
    pub subscriber_panics: usize,
}

/// Process-wide event bus handle.
///
/// Cloning is cheap and every clone shares one registry. Construct one per
/// application context and pass it down; tests build their own.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `event`.
    pub fn subscribe<F>(&self, event: AppEvent, f: F) -> Subscription
    where
        F: Fn(Option<&Payload>) + Send + Sync + 'static,
    {
        self.subscribe_callback(event, Arc::new(f))
    }

    /// Register an already-shared callback under `event`.
    ///
    /// Duplicates are allowed: registering the same callback twice makes it
    /// fire twice per emit.
    pub fn subscribe_callback(&self, event: AppEvent, callback: Callback) -> Subscription {
        let id = self.register(event, callback);
        Subscription::new(Arc::downgrade(&self.inner), vec![(event, id)])
    }

    /// Register one callback under several events.
    ///
    /// Each event gets an independent registration; the returned handle
    /// removes all of them under a single registry lock.
    pub fn subscribe_many<F>(&self, events: &[AppEvent], f: F) -> Subscription
    where
        F: Fn(Option<&Payload>) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(f);
        let mut registry = self.inner.registry.lock();
        let keys = events
            .iter()
            .map(|&event| {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                registry.entry(event).or_default().push(Entry {
                    id,
                    callback: Arc::clone(&callback),
                });
                (event, id)
            })
            .collect();
        drop(registry);
        Subscription::new(Arc::downgrade(&self.inner), keys)
    }

    /// Remove every registration of `callback` under `event` (identity
    /// comparison). Returns how many registrations were removed.
    pub fn unsubscribe(&self, event: AppEvent, callback: &Callback) -> usize {
        let mut registry = self.inner.registry.lock();
        let Some(list) = registry.get_mut(&event) else {
            return 0;
        };
        let before = list.len();
        list.retain(|entry| !Arc::ptr_eq(&entry.callback, callback));
        let removed = before - list.len();
        if list.is_empty() {
            registry.remove(&event);
        }
        removed
    }

    /// Deliver `payload` to every callback currently registered under `event`.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn emit(&self, event: AppEvent, payload: Option<&Payload>) -> usize {
        let callbacks: Vec<Callback> = {
            let registry = self.inner.registry.lock();
            registry
                .get(&event)
                .map(|list| list.iter().map(|e| Arc::clone(&e.callback)).collect())
                .unwrap_or_default()
        };

        let diag = &self.inner.diagnostics;
        diag.emitted.fetch_add(1, Ordering::Relaxed);
        debug!(event = event.as_str(), subscribers = callbacks.len(), "emit");

        let mut delivered = 0;
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    diag.subscriber_panics.fetch_add(1, Ordering::Relaxed);
                    error!(
                        event = event.as_str(),
                        reason = panic_message(panic.as_ref()),
                        "event subscriber panicked; continuing delivery"
                    );
                }
            }
        }
        diag.delivered.fetch_add(delivered, Ordering::Relaxed);
        delivered
    }

    /// Drop every registration. Outstanding [`Subscription`]s become no-ops.
    pub fn clear(&self) {
        self.inner.registry.lock().clear();
    }

    pub fn subscriber_count(&self, event: AppEvent) -> usize {
        self.inner
            .registry
            .lock()
            .get(&event)
            .map_or(0, |list| list.len())
    }

    pub fn diagnostics_snapshot(&self) -> BusDiagnosticsSnapshot {
        let d = &self.inner.diagnostics;
        BusDiagnosticsSnapshot {
            emitted: d.emitted.load(Ordering::Relaxed),
            delivered: d.delivered.load(Ordering::Relaxed),
            subscriber_panics: d.subscriber_panics.load(Ordering::Relaxed),
        }
    }

    fn register(&self, event: AppEvent, callback: Callback) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .registry
            .lock()
            .entry(event)
            .or_default()
            .push(Entry { id, callback });
        id
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

/// Teardown handle returned by the `subscribe*` methods.
///
/// Dropping it does **not** unsubscribe; call [`Subscription::unsubscribe`]
/// when the owner goes away. Calling it more than once is a no-op.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    bus: Weak<BusInner>,
    keys: Vec<(AppEvent, u64)>,
    released: AtomicBool,
}

impl Subscription {
    fn new(bus: Weak<BusInner>, keys: Vec<(AppEvent, u64)>) -> Self {
        Self {
            bus,
            keys,
            released: AtomicBool::new(false),
        }
    }

    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut registry = bus.registry.lock();
        for (event, id) in &self.keys {
            if let Some(list) = registry.get_mut(event) {
                list.retain(|entry| entry.id != *id);
                if list.is_empty() {
                    registry.remove(event);
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Events this handle was registered under.
    pub fn events(&self) -> impl Iterator<Item = AppEvent> + '_ {
        self.keys.iter().map(|(event, _)| *event)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
