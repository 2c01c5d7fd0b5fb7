//! Keyed query cache and mutations over the backend.
//!
//! A `Query` caches one resource under a fixed key. Concurrent readers share
//! the in-flight request, and every settle is broadcast so a UI can redraw.
//! A `Mutation` runs a write, tracks how many calls are pending, and runs an
//! optional hook on success (the chat mutation uses it to invalidate context).
//!
//! Starting a request spawns its driver on the current tokio runtime, so
//! `ensure` and `refetch` must be called from within one.

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::api::Backend;
use crate::error::{ApiError, ApiResult};
use crate::model::{FitnessContext, McpTool, ModelOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Models,
    Context,
    Tools,
}

impl QueryKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKey::Models => "models",
            QueryKey::Context => "context",
            QueryKey::Tools => "tools",
        }
    }
}

/// Completes with the query's result; clones observe the same value
pub type QueryFuture<T> = Shared<BoxFuture<'static, ApiResult<T>>>;

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

/// Point-in-time view of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub is_fetching: bool,
    pub is_stale: bool,
}

impl<T> QueryState<T> {
    /// First load still pending (no data to show yet)
    pub fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }
}

struct Slot<T> {
    data: Option<T>,
    error: Option<ApiError>,
    stale: bool,
    generation: u64,
    in_flight: Option<QueryFuture<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            stale: false,
            generation: 0,
            in_flight: None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Query<T> {
    key: QueryKey,
    slot: Arc<Mutex<Slot<T>>>,
    fetcher: Fetcher<T>,
    notify: broadcast::Sender<QueryKey>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            slot: Arc::clone(&self.slot),
            fetcher: Arc::clone(&self.fetcher),
            notify: self.notify.clone(),
        }
    }
}

impl<T> Query<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(key: QueryKey, fetcher: F, notify: broadcast::Sender<QueryKey>) -> Self
    where
        F: Fn() -> BoxFuture<'static, ApiResult<T>> + Send + Sync + 'static,
    {
        Self {
            key,
            slot: Arc::new(Mutex::new(Slot::default())),
            fetcher: Arc::new(fetcher),
            notify,
        }
    }

    pub fn state(&self) -> QueryState<T> {
        let slot = lock(&self.slot);
        QueryState {
            data: slot.data.clone(),
            error: slot.error.clone(),
            is_fetching: slot.in_flight.is_some(),
            is_stale: slot.stale,
        }
    }

    pub fn data(&self) -> Option<T> {
        lock(&self.slot).data.clone()
    }

    pub fn is_fetching(&self) -> bool {
        lock(&self.slot).in_flight.is_some()
    }

    /// Read through the cache: join the in-flight request, return fresh data,
    /// or start a request when there is nothing fresh.
    pub fn ensure(&self) -> QueryFuture<T> {
        let mut slot = lock(&self.slot);
        if let Some(in_flight) = &slot.in_flight {
            return in_flight.clone();
        }
        if let (Some(data), false) = (&slot.data, slot.stale) {
            let data = data.clone();
            return future::ready(Ok(data)).boxed().shared();
        }
        self.start(&mut slot)
    }

    /// Always issue a fresh request; an older in-flight result is discarded.
    pub fn refetch(&self) -> QueryFuture<T> {
        let mut slot = lock(&self.slot);
        self.start(&mut slot)
    }

    /// Mark cached data stale so the next `ensure` goes to the backend.
    /// A request already in flight started before the invalidation, so it is
    /// superseded by a fresh one.
    pub fn invalidate(&self) {
        {
            let mut slot = lock(&self.slot);
            slot.stale = true;
            if slot.in_flight.is_some() {
                drop(self.start(&mut slot));
            }
        }
        tracing::debug!(query = self.key.as_str(), "query invalidated");
        let _ = self.notify.send(self.key);
    }

    fn start(&self, slot: &mut Slot<T>) -> QueryFuture<T> {
        slot.generation += 1;
        let generation = slot.generation;
        let key = self.key;
        let request = (self.fetcher)();
        let state = Arc::clone(&self.slot);
        let notify = self.notify.clone();

        tracing::debug!(query = key.as_str(), generation, "query fetch started");

        let fut = async move {
            let result = request.await;
            {
                let mut slot = lock(&state);
                if slot.generation == generation {
                    slot.in_flight = None;
                    match &result {
                        Ok(data) => {
                            slot.data = Some(data.clone());
                            slot.error = None;
                            slot.stale = false;
                        }
                        Err(e) => {
                            tracing::warn!(query = key.as_str(), error = %e, "query failed");
                            slot.error = Some(e.clone());
                        }
                    }
                } else {
                    tracing::debug!(query = key.as_str(), generation, "superseded result dropped");
                }
            }
            let _ = notify.send(key);
            result
        }
        .boxed()
        .shared();

        slot.in_flight = Some(fut.clone());
        tokio::spawn(fut.clone());
        fut
    }
}

/// The three cached resources, sharing one change-notification channel
pub struct QueryClient {
    pub models: Query<Vec<ModelOption>>,
    pub context: Query<FitnessContext>,
    pub tools: Query<Vec<McpTool>>,
    notify: broadcast::Sender<QueryKey>,
}

impl QueryClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (notify, _) = broadcast::channel(64);

        let b = Arc::clone(&backend);
        let models = Query::new(
            QueryKey::Models,
            move || {
                let b = Arc::clone(&b);
                async move { b.models().await }.boxed()
            },
            notify.clone(),
        );

        let b = Arc::clone(&backend);
        let context = Query::new(
            QueryKey::Context,
            move || {
                let b = Arc::clone(&b);
                async move { b.context().await }.boxed()
            },
            notify.clone(),
        );

        let b = backend;
        let tools = Query::new(
            QueryKey::Tools,
            move || {
                let b = Arc::clone(&b);
                async move { b.tools().await }.boxed()
            },
            notify.clone(),
        );

        Self {
            models,
            context,
            tools,
            notify,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.notify.subscribe()
    }

    /// Re-read every query that has gone stale
    pub fn ensure_stale(&self) {
        if self.models.state().is_stale {
            drop(self.models.ensure());
        }
        if self.context.state().is_stale {
            drop(self.context.ensure());
        }
        if self.tools.state().is_stale {
            drop(self.tools.ensure());
        }
    }
}

type MutateFn<V, R> = Arc<dyn Fn(V) -> BoxFuture<'static, ApiResult<R>> + Send + Sync>;
type SuccessHook<R> = Arc<dyn Fn(&R) + Send + Sync>;

struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Mutation<V, R> {
    name: &'static str,
    run: MutateFn<V, R>,
    on_success: Option<SuccessHook<R>>,
    pending: Arc<AtomicUsize>,
}

impl<V, R> Clone for Mutation<V, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            run: Arc::clone(&self.run),
            on_success: self.on_success.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<V, R> Mutation<V, R>
where
    V: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn(V) -> BoxFuture<'static, ApiResult<R>> + Send + Sync + 'static,
    {
        Self {
            name,
            run: Arc::new(run),
            on_success: None,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn on_success<H>(mut self, hook: H) -> Self
    where
        H: Fn(&R) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Start a call. The pending flag is raised before this returns and
    /// lowered when the future settles or is dropped.
    pub fn mutate(&self, vars: V) -> BoxFuture<'static, ApiResult<R>> {
        let guard = PendingGuard::new(&self.pending);
        let request = (self.run)(vars);
        let hook = self.on_success.clone();
        let name = self.name;

        async move {
            let result = request.await;
            drop(guard);
            match &result {
                Ok(value) => {
                    tracing::debug!(mutation = name, "mutation succeeded");
                    if let Some(hook) = hook {
                        hook(value);
                    }
                }
                Err(e) => tracing::warn!(mutation = name, error = %e, "mutation failed"),
            }
            result
        }
        .boxed()
    }
}
