//! Request lifecycle for queries and mutations against external data.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──call──► Loading ──► Success
//!                       └──► Error
//! ```
//!
//! A new call on the same hook moves it back to `Loading`. Each call takes a
//! generation number; a result is applied only if no newer call, `reset()`
//! or teardown happened in the meantime.
//!
//! ## Invalidation
//!
//! Successful mutations bump the shared [`RefreshCounter`]; every watching
//! query re-fetches once per bump. Bumps are not coalesced.

pub mod mutation;
pub mod query;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub use mutation::{BatchMutationHook, MutationHook, MutationOptions};
pub use query::{QueryHook, QueryOptions, QueryWatch};

use crate::bus::{AppEvent, EventBus, Subscription};

/// Status broadcast capacity per hook.
const STATUS_CAP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Why a request did not produce data.
///
/// Cloneable because the same error is kept in hook state and handed back
/// to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// Displays the whole context chain, outermost first.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),

    /// The caller-supplied deadline passed before the producer settled.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl RequestError {
    pub fn failed(err: anyhow::Error) -> Self {
        RequestError::Failed(Arc::new(err))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout(_))
    }

    /// Every message in the cause chain, outermost first.
    pub fn messages(&self) -> Vec<String> {
        match self {
            RequestError::Failed(e) => e.chain().map(ToString::to_string).collect(),
            RequestError::Timeout(_) => vec![self.to_string()],
        }
    }
}

/// Snapshot of a hook.
#[derive(Debug, Clone)]
pub struct RequestState<T> {
    pub status: RequestStatus,
    pub data: Option<T>,
    pub error: Option<RequestError>,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            status: RequestStatus::Idle,
            data: None,
            error: None,
        }
    }
}

impl<T> RequestState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == RequestStatus::Loading
    }
}

struct CellInner<T> {
    state: RequestState<T>,
    generation: u64,
}

/// State + generation guard shared by the hook types.
pub(crate) struct StateCell<T> {
    inner: Mutex<CellInner<T>>,
    status_tx: broadcast::Sender<RequestStatus>,
}

impl<T: Clone> StateCell<T> {
    pub(crate) fn new() -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CAP);
        Self {
            inner: Mutex::new(CellInner {
                state: RequestState::default(),
                generation: 0,
            }),
            status_tx,
        }
    }

    /// Enter `Loading` and return the generation this call owns.
    pub(crate) fn begin(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state.status = RequestStatus::Loading;
        inner.state.error = None;
        let _ = self.status_tx.send(RequestStatus::Loading);
        inner.generation
    }

    /// Apply a success if `generation` is still current.
    pub(crate) fn succeed(&self, generation: u64, data: T) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state.status = RequestStatus::Success;
        inner.state.data = Some(data);
        inner.state.error = None;
        let _ = self.status_tx.send(RequestStatus::Success);
        true
    }

    /// Apply a failure if `generation` is still current.
    pub(crate) fn fail(&self, generation: u64, error: RequestError) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state.status = RequestStatus::Error;
        inner.state.error = Some(error);
        let _ = self.status_tx.send(RequestStatus::Error);
        true
    }

    /// Back to `Idle` with no data or error; in-flight calls become stale.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = RequestState::default();
        let _ = self.status_tx.send(RequestStatus::Idle);
    }

    /// Make in-flight calls stale. A pending `Loading` settles back to
    /// `Success` when earlier data is kept, otherwise to `Idle`.
    pub(crate) fn abandon(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if inner.state.status != RequestStatus::Loading {
            return;
        }
        let settled = if inner.state.data.is_some() {
            RequestStatus::Success
        } else {
            RequestStatus::Idle
        };
        inner.state.status = settled;
        let _ = self.status_tx.send(settled);
    }

    pub(crate) fn snapshot(&self) -> RequestState<T> {
        self.inner.lock().state.clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RequestStatus> {
        self.status_tx.subscribe()
    }
}

/// Await `fut`, giving up after `timeout` when one is set.
pub(crate) async fn settle<T>(
    fut: BoxFuture<'static, anyhow::Result<T>>,
    timeout: Option<Duration>,
) -> Result<T, RequestError> {
    match timeout {
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(RequestError::failed),
            Err(_) => Err(RequestError::Timeout(after)),
        },
        None => fut.await.map_err(RequestError::failed),
    }
}

struct RefreshInner {
    value: AtomicU64,
    tx: broadcast::Sender<u64>,
}

/// Shared invalidation signal. Clones share the same counter.
#[derive(Clone)]
pub struct RefreshCounter {
    inner: Arc<RefreshInner>,
}

/// Refresh ticks buffered per watcher before it starts lagging.
const REFRESH_CAP: usize = 64;

impl RefreshCounter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(REFRESH_CAP);
        Self {
            inner: Arc::new(RefreshInner {
                value: AtomicU64::new(0),
                tx,
            }),
        }
    }

    pub fn value(&self) -> u64 {
        self.inner.value.load(Ordering::SeqCst)
    }

    /// Bump the counter and wake every watcher. Returns the new value.
    pub fn trigger(&self) -> u64 {
        let next = self.inner.value.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.inner.tx.send(next);
        next
    }

    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.inner.tx.subscribe()
    }

    /// Bump the counter whenever any of `events` is emitted on `bus`.
    pub fn invalidate_on(&self, bus: &EventBus, events: &[AppEvent]) -> Subscription {
        let counter = self.clone();
        bus.subscribe_many(events, move |_| {
            counter.trigger();
        })
    }
}

impl Default for RefreshCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefreshCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCounter")
            .field("value", &self.value())
            .finish()
    }
}
