//! # Pending Loads
//!
//! A `PendingLoad` is the single in-flight operation for one resource id.
//! It resolves exactly once. Any number of parties may observe it:
//!
//! - `.await` it (it is a `Future`)
//! - attach a continuation with [`PendingLoad::on_resolve`]
//! - block on it with [`PendingLoad::wait_timeout`]
//!
//! Continuations attached after resolution run immediately on the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::loader::Payload;
use crate::{ResourceError, ResourceId};

/// Result a load settles with.
pub type LoadOutcome = Result<Payload, ResourceError>;

type Continuation = Box<dyn FnOnce(&LoadOutcome) + Send + 'static>;

#[derive(Default)]
struct PendingState {
    outcome: Option<LoadOutcome>,
    continuations: Vec<Continuation>,
    wakers: Vec<Waker>,
    /// All continuations registered before resolution have run.
    settled: bool,
}

#[derive(Default)]
struct PendingInner {
    state: Mutex<PendingState>,
    settled: Condvar,
}

/// Shared handle to one in-flight load.
#[derive(Clone)]
pub struct PendingLoad {
    id: ResourceId,
    inner: Arc<PendingInner>,
}

impl std::fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLoad")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl PendingLoad {
    pub(crate) fn new(id: ResourceId) -> Self {
        Self {
            id,
            inner: Arc::new(PendingInner::default()),
        }
    }

    /// The resource being loaded.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// True once an outcome is recorded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// The outcome, if resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<LoadOutcome> {
        self.inner.state.lock().outcome.clone()
    }

    /// Runs `f` with the outcome once resolved.
    pub fn on_resolve<F>(&self, f: F)
    where
        F: FnOnce(&LoadOutcome) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                f(&outcome);
            }
            None => state.continuations.push(Box::new(f)),
        }
    }

    /// Records the outcome and runs every continuation. Later calls are
    /// ignored and return false.
    pub(crate) fn resolve(&self, outcome: LoadOutcome) -> bool {
        let (continuations, wakers) = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut state.continuations),
                std::mem::take(&mut state.wakers),
            )
        };

        for continuation in continuations {
            continuation(&outcome);
        }
        for waker in wakers {
            waker.wake();
        }

        self.inner.state.lock().settled = true;
        self.inner.settled.notify_all();
        true
    }

    /// Blocks until resolved and every earlier continuation has run, or
    /// until `timeout` elapses.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadOutcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.settled {
            if self.inner.settled.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.settled {
            state.outcome.clone()
        } else {
            None
        }
    }
}

impl Future for PendingLoad {
    type Output = LoadOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload(value: u32) -> Payload {
        Arc::new(value)
    }

    #[test]
    fn test_resolves_once() {
        let pending = PendingLoad::new(3);
        assert!(!pending.is_resolved());
        assert!(pending.resolve(Ok(payload(1))));
        assert!(!pending.resolve(Ok(payload(2))));

        let value = pending.outcome().unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn test_continuations_before_and_after_resolution() {
        let pending = PendingLoad::new(1);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        pending.on_resolve(move |outcome| {
            assert!(outcome.is_err());
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        pending.resolve(Err(ResourceError::UnknownResource(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let c = Arc::clone(&calls);
        pending.on_resolve(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_timeout_expires_when_unresolved() {
        let pending = PendingLoad::new(1);
        assert!(pending.wait_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_wait_across_threads() {
        let pending = PendingLoad::new(9);
        let waiter = pending.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        pending.resolve(Ok(payload(7)));
        let outcome = handle.join().unwrap().unwrap().unwrap();
        assert_eq!(outcome.downcast_ref::<u32>(), Some(&7));
    }

    #[tokio::test]
    async fn test_await_from_many_tasks() {
        let pending = PendingLoad::new(2);
        let tasks: Vec<_> = (0..8).map(|_| tokio::spawn(pending.clone())).collect();
        pending.resolve(Ok(payload(11)));
        for task in tasks {
            let value = task.await.unwrap().unwrap();
            assert_eq!(value.downcast_ref::<u32>(), Some(&11));
        }
    }
}
