//! Mutation hooks: one-argument async writes with standard side effects.
//!
//! On success, in order: state → `Success`, success toast (when a message
//! is configured), refresh counter +1, optional domain event on the bus.
//! On failure: state → `Error`, error toast, and the error goes back to the
//! caller so it can keep a form open or refuse to navigate.
//!
//! Input validation is the caller's business; the hook passes input through
//! untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tokio::sync::broadcast;
use tracing::debug;

use super::{settle, RequestError, RequestState, RequestStatus, StateCell};
use crate::bus::{AppEvent, Payload};
use crate::services::Services;

type MutationFn<I, T> = dyn Fn(I) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync;
type PayloadFn<T> = dyn Fn(&T) -> Option<Payload> + Send + Sync;

const DEFAULT_ERROR_TITLE: &str = "Action failed";

/// Side effects attached to a mutation.
pub struct MutationOptions<T> {
    /// Success toast title; `None` means no success toast.
    pub success_message: Option<String>,
    pub error_title: String,
    emits: Option<(AppEvent, Option<Arc<PayloadFn<T>>>)>,
    /// Give up (with `RequestError::Timeout`) if the write has not settled.
    pub timeout: Option<Duration>,
}

impl<T> Default for MutationOptions<T> {
    fn default() -> Self {
        Self {
            success_message: None,
            error_title: DEFAULT_ERROR_TITLE.to_string(),
            emits: None,
            timeout: None,
        }
    }
}

impl<T> Clone for MutationOptions<T> {
    fn clone(&self) -> Self {
        Self {
            success_message: self.success_message.clone(),
            error_title: self.error_title.clone(),
            emits: self.emits.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T> MutationOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn error_title(mut self, title: impl Into<String>) -> Self {
        self.error_title = title.into();
        self
    }

    /// Emit `event` without a payload after each successful write.
    pub fn emits(mut self, event: AppEvent) -> Self {
        self.emits = Some((event, None));
        self
    }

    /// Emit `event` with a payload derived from the result.
    pub fn emits_with<F>(mut self, event: AppEvent, payload: F) -> Self
    where
        F: Fn(&T) -> Option<Payload> + Send + Sync + 'static,
    {
        self.emits = Some((event, Some(Arc::new(payload))));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct MutationCore<I, T> {
    services: Services,
    run: Arc<MutationFn<I, T>>,
    options: MutationOptions<T>,
}

impl<I, T> MutationCore<I, T>
where
    I: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn call(&self, input: I) -> BoxFuture<'static, anyhow::Result<T>> {
        (self.run)(input)
    }

    /// Success side effects for `results`, all produced by one call.
    fn after_success(&self, results: &[T]) {
        if let Some(message) = &self.options.success_message {
            self.services.notifier.success(message.clone(), None);
        }
        let refresh = self.services.refresh.trigger();
        debug!(refresh, items = results.len(), "mutation succeeded");

        if let Some((event, payload_fn)) = &self.options.emits {
            for result in results {
                let payload = payload_fn.as_ref().and_then(|f| f(result));
                self.services.bus.emit(*event, payload.as_ref());
            }
        }
    }

    fn after_failure(&self, err: &RequestError) {
        self.services
            .notifier
            .report_error(&self.options.error_title, err);
    }
}

/// Hook around a single-input mutation.
pub struct MutationHook<I, T> {
    core: Arc<MutationCore<I, T>>,
    cell: Arc<StateCell<T>>,
}

impl<I, T> Clone for MutationHook<I, T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<I, T> MutationHook<I, T>
where
    I: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(services: &Services, f: F, options: MutationOptions<T>) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let run: Arc<MutationFn<I, T>> = Arc::new(move |input| f(input).boxed());
        Self {
            core: Arc::new(MutationCore {
                services: services.clone(),
                run,
                options,
            }),
            cell: Arc::new(StateCell::new()),
        }
    }

    /// Run the write. The result (or error) is both recorded in the hook
    /// and returned.
    pub async fn mutate(&self, input: I) -> Result<T, RequestError> {
        let generation = self.cell.begin();
        let outcome = settle(self.core.call(input), self.core.options.timeout).await;

        match outcome {
            Ok(data) => {
                self.cell.succeed(generation, data.clone());
                self.core.after_success(std::slice::from_ref(&data));
                Ok(data)
            }
            Err(err) => {
                self.cell.fail(generation, err.clone());
                self.core.after_failure(&err);
                Err(err)
            }
        }
    }

    /// A batch hook over the same write function and options, with its
    /// own state.
    pub fn batch(&self) -> BatchMutationHook<I, T> {
        BatchMutationHook {
            core: Arc::clone(&self.core),
            cell: Arc::new(StateCell::new()),
        }
    }

    pub fn state(&self) -> RequestState<T> {
        self.cell.snapshot()
    }

    pub fn status(&self) -> RequestStatus {
        self.cell.snapshot().status
    }

    /// Every transition from now on.
    pub fn subscribe_status(&self) -> broadcast::Receiver<RequestStatus> {
        self.cell.subscribe()
    }

    /// Back to `Idle`. The refresh counter and other hooks are untouched.
    pub fn reset(&self) {
        self.cell.reset();
    }
}

/// Hook that runs the write for many inputs concurrently and settles once.
pub struct BatchMutationHook<I, T> {
    core: Arc<MutationCore<I, T>>,
    cell: Arc<StateCell<Vec<T>>>,
}

impl<I, T> BatchMutationHook<I, T>
where
    I: Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Run every input. An empty batch resolves to `Ok(None)` without
    /// touching state, the refresh counter or the bus.
    ///
    /// The first failure fails the whole batch; writes that already
    /// completed are not rolled back.
    pub async fn mutate_batch(&self, inputs: Vec<I>) -> Result<Option<Vec<T>>, RequestError> {
        if inputs.is_empty() {
            return Ok(None);
        }

        let generation = self.cell.begin();
        let calls: Vec<_> = inputs.into_iter().map(|input| self.core.call(input)).collect();
        let all = try_join_all(calls).boxed();
        let outcome = settle(all, self.core.options.timeout).await;

        match outcome {
            Ok(results) => {
                self.cell.succeed(generation, results.clone());
                self.core.after_success(&results);
                Ok(Some(results))
            }
            Err(err) => {
                self.cell.fail(generation, err.clone());
                self.core.after_failure(&err);
                Err(err)
            }
        }
    }

    pub fn state(&self) -> RequestState<Vec<T>> {
        self.cell.snapshot()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<RequestStatus> {
        self.cell.subscribe()
    }

    pub fn reset(&self) {
        self.cell.reset();
    }
}
