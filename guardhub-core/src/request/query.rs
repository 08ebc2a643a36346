//! Query hooks: zero-argument async reads that re-run on invalidation.

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{settle, RequestError, RequestState, RequestStatus, StateCell};
use crate::services::Services;

type QueryFn<T> = dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;

const DEFAULT_ERROR_TITLE: &str = "Could not load data";

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub error_title: String,
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            error_title: DEFAULT_ERROR_TITLE.to_string(),
            timeout: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_title(mut self, title: impl Into<String>) -> Self {
        self.error_title = title.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Hook around a read. Clones share state.
pub struct QueryHook<T> {
    services: Services,
    producer: Arc<QueryFn<T>>,
    options: Arc<QueryOptions>,
    cell: Arc<StateCell<T>>,
}

impl<T> Clone for QueryHook<T> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            producer: Arc::clone(&self.producer),
            options: Arc::clone(&self.options),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> QueryHook<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(services: &Services, producer: F, options: QueryOptions) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let producer: Arc<QueryFn<T>> = Arc::new(move || producer().boxed());
        Self {
            services: services.clone(),
            producer,
            options: Arc::new(options),
            cell: Arc::new(StateCell::new()),
        }
    }

    /// Run the producer once. Previous data stays visible while loading.
    pub async fn fetch(&self) -> Result<T, RequestError> {
        self.fetch_guarded(None).await
    }

    async fn fetch_guarded(&self, live: Option<&AtomicBool>) -> Result<T, RequestError> {
        let generation = self.cell.begin();
        let outcome = settle((self.producer)(), self.options.timeout).await;

        let still_live = live.map_or(true, |flag| flag.load(Ordering::SeqCst));
        match &outcome {
            Ok(data) => {
                if !(still_live && self.cell.succeed(generation, data.clone())) {
                    trace!(generation, "stale query result dropped");
                }
            }
            Err(err) => {
                if still_live && self.cell.fail(generation, err.clone()) {
                    self.services
                        .notifier
                        .report_error(&self.options.error_title, err);
                } else {
                    debug!(generation, "stale query error dropped: {err}");
                }
            }
        }
        outcome
    }

    /// Fetch now, then again on every refresh-counter bump and every change
    /// of `deps` (a send with an equal value is ignored).
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch<D>(&self, deps: watch::Receiver<D>) -> QueryWatch
    where
        D: Clone + PartialEq + Send + Sync + 'static,
    {
        self.spawn_loop(Some(deps))
    }

    /// Like [`watch`](Self::watch) with an empty dependency set.
    pub fn watch_refresh(&self) -> QueryWatch {
        self.spawn_loop::<()>(None)
    }

    fn spawn_loop<D>(&self, deps: Option<watch::Receiver<D>>) -> QueryWatch
    where
        D: Clone + PartialEq + Send + Sync + 'static,
    {
        let live = Arc::new(AtomicBool::new(true));
        let hook = self.clone();
        let flag = Arc::clone(&live);
        // Subscribe before the first fetch so no bump in between is missed.
        let mut refresh = self.services.refresh.subscribe();

        let handle = tokio::spawn(async move {
            let mut deps = deps;
            let mut last = deps.as_mut().map(|rx| rx.borrow_and_update().clone());
            let _ = hook.fetch_guarded(Some(&flag)).await;

            loop {
                tokio::select! {
                    tick = refresh.recv() => match tick {
                        Ok(value) => trace!(value, "refresh tick"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "refresh ticks lagged; fetching once");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = dependency_changed(&mut deps) => {
                        if !changed {
                            continue;
                        }
                        let current = deps.as_mut().map(|rx| rx.borrow_and_update().clone());
                        if current == last {
                            continue;
                        }
                        last = current;
                    }
                }

                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                let _ = hook.fetch_guarded(Some(&flag)).await;
            }
        });

        let cell = Arc::clone(&self.cell);
        QueryWatch {
            live,
            handle,
            abandon: Box::new(move || cell.abandon()),
        }
    }

    pub fn state(&self) -> RequestState<T> {
        self.cell.snapshot()
    }

    pub fn status(&self) -> RequestStatus {
        self.cell.snapshot().status
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<RequestStatus> {
        self.cell.subscribe()
    }

    /// Back to `Idle`. In-flight results are dropped; a running watch keeps
    /// watching.
    pub fn reset(&self) {
        self.cell.reset();
    }
}

/// Resolves `true` when `deps` has a new value, `false` when its sender
/// went away. With no dependency set it never resolves.
async fn dependency_changed<D>(deps: &mut Option<watch::Receiver<D>>) -> bool {
    let Some(rx) = deps.as_mut() else {
        return std::future::pending().await;
    };
    if rx.changed().await.is_ok() {
        return true;
    }
    *deps = None;
    false
}

/// Teardown for a [`QueryHook::watch`] loop. Stops on drop.
#[must_use = "dropping a QueryWatch stops the watch loop"]
pub struct QueryWatch {
    live: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    abandon: Box<dyn Fn() + Send + Sync>,
}

impl QueryWatch {
    /// Stop re-fetching and drop any in-flight result; a pending load
    /// settles back to the last known status. Idempotent.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.handle.abort();
            (self.abandon)();
        }
    }

    pub fn is_active(&self) -> bool {
        self.live.load(Ordering::SeqCst) && !self.handle.is_finished()
    }
}

impl Drop for QueryWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for QueryWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryWatch")
            .field("active", &self.is_active())
            .finish()
    }
}
