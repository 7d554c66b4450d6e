//! Read-side data holder used by every screen.
//!
//! A [`Query`] owns one [`QueryState`] and keeps it in sync with the latest
//! invocation of its fetch function. It refetches when the dependency value
//! changes, retries failed fetches with a fixed delay, and publishes every
//! state change on a `watch` channel so views can re-render.
//!
//! Only the most recently *issued* request may commit: each fetch is tagged
//! with a generation number and results from superseded generations are
//! dropped. After [`Query::unmount`] (or drop) nothing commits at all and
//! pending retry timers are cancelled; in-flight network calls are left to
//! finish on their own.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::error_message;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type FetchFn<P, T> = Arc<dyn Fn(P) -> BoxFuture<Result<T, String>> + Send + Sync>;

/// Default delay between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// When false the query never fetches and reports `loading = false`.
    pub enabled: bool,
    /// Extra attempts after a failure.
    pub retry: u32,
    pub retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn retry(mut self, retry: u32, delay: Duration) -> Self {
        self.retry = retry;
        self.retry_delay = delay;
        self
    }
}

struct Inner<P, T, D> {
    fetch_fn: FetchFn<P, T>,
    params: P,
    deps: D,
    options: QueryOptions,
    retry_count: u32,
    generation: u64,
}

struct Shared<P, T, D> {
    inner: Mutex<Inner<P, T, D>>,
    state: watch::Sender<QueryState<T>>,
    unmounted: CancellationToken,
}

impl<P, T, D> Shared<P, T, D> {
    fn lock(&self) -> MutexGuard<'_, Inner<P, T, D>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a state change unless the owner is gone.
    fn commit(&self, update: impl FnOnce(&mut QueryState<T>)) {
        if self.unmounted.is_cancelled() {
            return;
        }
        self.state.send_modify(update);
    }
}

pub struct Query<P, T, D> {
    shared: Arc<Shared<P, T, D>>,
}

impl<P, T, D> Query<P, T, D>
where
    P: Clone + Send + 'static,
    T: Send + Sync + 'static,
    D: PartialEq + Send + 'static,
{
    /// Create the query and, when enabled, issue the first fetch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount<F, Fut, E>(fetch_fn: F, params: P, deps: D, options: QueryOptions) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + 'static,
    {
        let (state, _) = watch::channel(QueryState {
            data: None,
            loading: options.enabled,
            error: None,
        });
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                fetch_fn: box_fetch(fetch_fn),
                params,
                deps,
                options,
                retry_count: 0,
                generation: 0,
            }),
            state,
            unmounted: CancellationToken::new(),
        });
        if options.enabled {
            start_fetch(&shared);
        }
        Self { shared }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> QueryState<T>
    where
        T: Clone,
    {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.shared.state.subscribe()
    }

    /// Wait until the query is no longer loading and return that state.
    pub async fn wait_settled(&self) -> QueryState<T>
    where
        T: Clone,
    {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let settled = rx.wait_for(|s| !s.loading).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| self.state())
    }

    /// Replace the parameters and dependency value. Fetches again only when
    /// the dependency value changed and the query is enabled; the new
    /// parameters are kept either way for the next fetch.
    pub fn set_dependencies(&self, params: P, deps: D) {
        let changed = {
            let mut inner = self.shared.lock();
            inner.params = params;
            if inner.deps == deps {
                false
            } else {
                inner.deps = deps;
                inner.retry_count = 0;
                inner.options.enabled
            }
        };
        if changed {
            start_fetch(&self.shared);
        }
    }

    /// Swap the fetch function used by later fetches.
    pub fn set_fetch_fn<F, Fut, E>(&self, fetch_fn: F)
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + 'static,
    {
        self.shared.lock().fetch_fn = box_fetch(fetch_fn);
    }

    /// Enabling fetches immediately; disabling drops any in-flight result
    /// and reports `loading = false`.
    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut inner = self.shared.lock();
            if inner.options.enabled == enabled {
                return;
            }
            inner.options.enabled = enabled;
            inner.retry_count = 0;
            if !enabled {
                inner.generation += 1;
                self.shared.commit(|s| s.loading = false);
                return;
            }
        }
        start_fetch(&self.shared);
    }

    /// Re-run the fetch with the latest function and parameters. A disabled
    /// query ignores the call.
    pub fn refetch(&self) {
        refetch_shared(&self.shared);
    }

    /// A cloneable handle that triggers [`Query::refetch`] without owning the
    /// query. Calls after the query is gone are ignored.
    pub fn refetch_handle(&self) -> RefetchHandle {
        let weak: Weak<Shared<P, T, D>> = Arc::downgrade(&self.shared);
        RefetchHandle {
            refetch: Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    refetch_shared(&shared);
                }
            }),
        }
    }

    /// Suppress every further state change and cancel pending retries.
    pub fn unmount(&self) {
        self.shared.unmounted.cancel();
    }

    pub fn is_mounted(&self) -> bool {
        !self.shared.unmounted.is_cancelled()
    }
}

impl<P, T, D> Drop for Query<P, T, D> {
    fn drop(&mut self) {
        self.shared.unmounted.cancel();
    }
}

#[derive(Clone)]
pub struct RefetchHandle {
    refetch: Arc<dyn Fn() + Send + Sync>,
}

impl RefetchHandle {
    pub fn refetch(&self) {
        (self.refetch)();
    }
}

impl std::fmt::Debug for RefetchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefetchHandle").finish_non_exhaustive()
    }
}

fn box_fetch<P, T, F, Fut, E>(fetch_fn: F) -> FetchFn<P, T>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Display + 'static,
    T: 'static,
{
    Arc::new(move |params: P| -> BoxFuture<Result<T, String>> {
        let fut = fetch_fn(params);
        Box::pin(async move { fut.await.map_err(|e| error_message(&e)) })
    })
}

fn refetch_shared<P, T, D>(shared: &Arc<Shared<P, T, D>>)
where
    P: Clone + Send + 'static,
    T: Send + Sync + 'static,
    D: Send + 'static,
{
    {
        let mut inner = shared.lock();
        if !inner.options.enabled {
            debug!("refetch ignored, query disabled");
            return;
        }
        inner.retry_count = 0;
    }
    start_fetch(shared);
}

/// Issue a new request generation and spawn it.
fn start_fetch<P, T, D>(shared: &Arc<Shared<P, T, D>>)
where
    P: Clone + Send + 'static,
    T: Send + Sync + 'static,
    D: Send + 'static,
{
    if shared.unmounted.is_cancelled() {
        return;
    }
    let (generation, fetch_fn, params) = {
        let mut inner = shared.lock();
        // Disabled between the caller's check and here.
        if !inner.options.enabled {
            return;
        }
        inner.generation += 1;
        shared.commit(|s| {
            s.loading = true;
            s.error = None;
        });
        (inner.generation, inner.fetch_fn.clone(), inner.params.clone())
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let result = fetch_fn(params).await;
        settle(&shared, generation, result);
    });
}

fn settle<P, T, D>(shared: &Arc<Shared<P, T, D>>, generation: u64, result: Result<T, String>)
where
    P: Clone + Send + 'static,
    T: Send + Sync + 'static,
    D: Send + 'static,
{
    if shared.unmounted.is_cancelled() {
        debug!(generation, "query unmounted, dropping result");
        return;
    }

    // Every generation bump and every commit happens under `inner`, so a
    // result checked here cannot land after a newer request or a disable.
    let retry_delay = {
        let mut inner = shared.lock();
        if inner.generation != generation {
            debug!(
                generation,
                current = inner.generation,
                "dropping superseded query result"
            );
            return;
        }
        match result {
            Ok(data) => {
                inner.retry_count = 0;
                shared.commit(|s| {
                    s.data = Some(data);
                    s.error = None;
                    s.loading = false;
                });
                None
            }
            Err(message) => {
                warn!(error = %message, "query fetch failed");
                shared.commit(|s| {
                    s.error = Some(message);
                    s.loading = false;
                });
                if inner.retry_count < inner.options.retry {
                    inner.retry_count += 1;
                    Some((inner.options.retry_delay, inner.retry_count))
                } else {
                    None
                }
            }
        }
    };

    if let Some((delay, attempt)) = retry_delay {
        schedule_retry(shared, generation, delay, attempt);
    }
}

fn schedule_retry<P, T, D>(shared: &Arc<Shared<P, T, D>>, generation: u64, delay: Duration, attempt: u32)
where
    P: Clone + Send + 'static,
    T: Send + Sync + 'static,
    D: Send + 'static,
{
    debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling query retry");
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::select! {
            _ = shared.unmounted.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        // A newer fetch (dependency change, refetch, disable) owns the state now.
        if shared.lock().generation != generation {
            return;
        }
        start_fetch(&shared);
    });
}
