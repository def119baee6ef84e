use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::scheduler::EngineMetrics;

pub(crate) type Job<R> = Box<dyn FnOnce() -> EngineResult<R> + Send + 'static>;

enum State<R> {
    /// Work not yet claimed by any thread.
    Queued(Job<R>),
    /// Work claimed and executing somewhere.
    Running,
    Done(EngineResult<R>),
    /// Value moved out by `into_result`.
    Consumed,
}

/// Who is expected to run queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Ready,
    Deferred,
    Pool,
}

pub(crate) struct Shared<R> {
    state: Mutex<State<R>>,
    resolved: Condvar,
    origin: Origin,
    metrics: Option<Arc<EngineMetrics>>,
}

impl<R> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, State<R>> {
        // State transitions never run user code under the lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim queued work and run it on the current thread.
    ///
    /// Returns false if the work was already claimed. Exactly one caller can
    /// win the claim, which makes execution exactly-once for every origin.
    pub(crate) fn try_run(&self, by_pool: bool) -> bool {
        let job = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, State::Running) {
                State::Queued(job) => job,
                other => {
                    *state = other;
                    return false;
                }
            }
        };

        if self.origin == Origin::Pool && !by_pool {
            trace!("observer ran queued async work inline");
            if let Some(metrics) = &self.metrics {
                metrics.record_inline_async();
            }
        }

        let outcome = catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload.as_ref()))));

        let mut state = self.lock();
        *state = State::Done(outcome);
        self.resolved.notify_all();
        true
    }
}

impl<R> Drop for Shared<R> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if matches!(state, State::Queued(_)) {
            trace!("deferred work dropped without being observed");
            if let Some(metrics) = &self.metrics {
                metrics.record_abandoned();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A result that may not have been computed yet.
///
/// Resolution happens at most once. Clones share the same slot, so several
/// threads may call [`Handle::get`] concurrently; queued work is executed by
/// exactly one of them and the rest block until it is done.
pub struct Handle<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for Handle<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.lock() {
            State::Queued(_) => "queued",
            State::Running => "running",
            State::Done(Ok(_)) => "resolved",
            State::Done(Err(_)) => "failed",
            State::Consumed => "consumed",
        };
        f.debug_struct("Handle")
            .field("state", &state)
            .field("origin", &self.shared.origin)
            .finish()
    }
}

impl<R> Handle<R> {
    /// An already-resolved handle.
    pub fn ready(result: EngineResult<R>) -> Self {
        Self::with_state(State::Done(result), Origin::Ready, None)
    }

    pub(crate) fn queued(job: Job<R>, origin: Origin, metrics: Option<Arc<EngineMetrics>>) -> Self {
        Self::with_state(State::Queued(job), origin, metrics)
    }

    fn with_state(state: State<R>, origin: Origin, metrics: Option<Arc<EngineMetrics>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                resolved: Condvar::new(),
                origin,
                metrics,
            }),
        }
    }

    pub(crate) fn shared(&self) -> Arc<Shared<R>> {
        Arc::clone(&self.shared)
    }

    /// Block until the result is available, running queued work inline if no
    /// other thread has claimed it yet.
    pub fn wait(&self) {
        if self.shared.try_run(false) {
            return;
        }
        let mut state = self.shared.lock();
        while matches!(*state, State::Running) {
            state = self
                .shared
                .resolved
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether the handle has left the pending states.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.shared.lock(), State::Done(_) | State::Consumed)
    }

    /// Wait and move the result out. Other clones observe [`EngineError::Consumed`] afterwards.
    pub fn into_result(self) -> EngineResult<R> {
        self.wait();
        let mut state = self.shared.lock();
        match std::mem::replace(&mut *state, State::Consumed) {
            State::Done(result) => result,
            State::Consumed => Err(EngineError::Consumed),
            State::Queued(_) | State::Running => {
                unreachable!("wait() returned before resolution")
            }
        }
    }
}

impl<R: Clone> Handle<R> {
    /// Wait and return a copy of the memoized result.
    pub fn get(&self) -> EngineResult<R> {
        self.wait();
        match &*self.shared.lock() {
            State::Done(result) => result.clone(),
            State::Consumed => Err(EngineError::Consumed),
            State::Queued(_) | State::Running => unreachable!("wait() returned before resolution"),
        }
    }
}
