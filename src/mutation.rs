//! Write-side wrapper: loading/error/data bookkeeping around one imperative
//! call. Unlike [`Query`](crate::query::Query) the error is handed back to
//! the caller after being recorded, so call sites can raise a toast.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::error::error_message;
use crate::query::BoxFuture;

#[derive(Debug, Clone, PartialEq)]
pub struct MutationState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for MutationState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

type MutationFn<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<Result<T, E>> + Send + Sync>;

pub struct Mutation<A, T, E> {
    mutation_fn: MutationFn<A, T, E>,
    state: watch::Sender<MutationState<T>>,
    /// Bumped by `reset`; results of calls started before it are not recorded.
    epoch: AtomicU64,
}

impl<A, T, E> Mutation<A, T, E>
where
    A: Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: std::fmt::Display + Send + 'static,
{
    pub fn new<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            mutation_fn: Arc::new(move |args: A| -> BoxFuture<Result<T, E>> {
                Box::pin(mutation_fn(args))
            }),
            state,
            epoch: AtomicU64::new(0),
        }
    }

    /// Run the mutation once. The result is recorded in the state and also
    /// returned; on failure the original error is returned unchanged.
    ///
    /// Dropping the returned future before it completes clears `loading`.
    pub async fn mutate(&self, args: A) -> Result<T, E> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        let _loading = LoadingGuard {
            state: &self.state,
            epoch: &self.epoch,
            started: epoch,
        };

        let result = (self.mutation_fn)(args).await;

        let current = self.epoch.load(Ordering::SeqCst) == epoch;
        match &result {
            Ok(data) if current => self.state.send_modify(|s| {
                s.data = Some(data.clone());
                s.loading = false;
            }),
            Err(e) => {
                let message = error_message(e);
                warn!(error = %message, "mutation failed");
                if current {
                    self.state.send_modify(|s| {
                        s.error = Some(message);
                        s.loading = false;
                    });
                }
            }
            Ok(_) => {}
        }
        result
    }

    /// Back to the initial state. Calls still in flight finish for their
    /// caller but no longer touch the state.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(MutationState::default());
    }

    pub fn state(&self) -> MutationState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<T>> {
        self.state.subscribe()
    }
}

/// Clears `loading` when a call ends, including when its future is dropped
/// mid-flight. Calls from before a `reset` leave the state alone.
struct LoadingGuard<'a, T> {
    state: &'a watch::Sender<MutationState<T>>,
    epoch: &'a AtomicU64,
    started: u64,
}

impl<T> Drop for LoadingGuard<'_, T> {
    fn drop(&mut self) {
        if self.epoch.load(Ordering::SeqCst) != self.started {
            return;
        }
        self.state
            .send_if_modified(|s| std::mem::replace(&mut s.loading, false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::time::Duration;

    #[tokio::test]
    async fn success_stores_and_returns_data() {
        let create = Mutation::new(|name: String| async move {
            Ok::<_, ApiError>(format!("created {name}"))
        });
        let out = create.mutate("Ana".into()).await.expect("mutate");
        assert_eq!(out, "created Ana");

        let state = create.state();
        assert_eq!(state.data.as_deref(), Some("created Ana"));
        assert!(!state.loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn failure_records_message_and_returns_original_error() {
        let delete = Mutation::new(|_id: i64| async {
            Err::<(), _>(ApiError::Http {
                status: 404,
                message: "Employee not found".into(),
            })
        });

        let err = delete.mutate(9).await.expect_err("must fail");
        assert!(matches!(err, ApiError::Http { status: 404, .. }));
        assert_eq!(err.to_string(), "Employee not found");

        let state = delete.state();
        assert_eq!(state.error.as_deref(), Some("Employee not found"));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn error_clears_on_next_success() {
        let flaky = Mutation::new(|ok: bool| async move {
            if ok {
                Ok(1)
            } else {
                Err("rejected")
            }
        });
        assert!(flaky.mutate(false).await.is_err());
        assert_eq!(flaky.state().error.as_deref(), Some("rejected"));

        flaky.mutate(true).await.expect("ok");
        let state = flaky.state();
        assert_eq!(state.error, None);
        assert_eq!(state.data, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn loading_is_visible_while_in_flight() {
        let slow = Arc::new(Mutation::new(|_: ()| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ApiError>(7)
        }));
        let runner = slow.clone();
        let task = tokio::spawn(async move { runner.mutate(()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(slow.state().loading);

        assert_eq!(task.await.expect("join").expect("mutate"), 7);
        assert!(!slow.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_call_does_not_leave_loading_stuck() {
        let slow = Arc::new(Mutation::new(|_: ()| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ApiError>(1)
        }));
        let runner = slow.clone();
        let task = tokio::spawn(async move { runner.mutate(()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(slow.state().loading);

        task.abort();
        assert!(task.await.expect_err("aborted").is_cancelled());
        let state = slow.state();
        assert!(!state.loading);
        assert_eq!(state.data, None);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_after_reset_leaves_state_alone() {
        let slow = Mutation::new(|_: ()| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ApiError>(1)
        });
        let mut call = Box::pin(slow.mutate(()));

        // Start the call, then give up on it.
        let _ = tokio::time::timeout(Duration::from_millis(10), &mut call).await;
        slow.reset();
        let mut rx = slow.subscribe();
        let _ = rx.borrow_and_update();
        drop(call);

        assert!(!rx.has_changed().expect("sender alive"));
        assert_eq!(slow.state(), MutationState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_in_flight_result() {
        let slow = Arc::new(Mutation::new(|_: ()| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ApiError>("stale")
        }));
        let runner = slow.clone();
        let task = tokio::spawn(async move { runner.mutate(()).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        slow.reset();
        assert_eq!(slow.state(), MutationState::default());

        // The caller still gets its value.
        assert_eq!(task.await.expect("join").expect("mutate"), "stale");
        assert_eq!(slow.state(), MutationState::default());
    }
}
