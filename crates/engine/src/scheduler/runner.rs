use std::fmt;
use std::sync::Arc;

use inncabs_core::EngineConfig;
use tracing::{info, trace};

use crate::error::{EngineError, EngineResult};
use crate::handle::{Handle, Job, Origin};
use crate::policy::Policy;

use super::admission::AdmissionCounter;
use super::metrics::{EngineMetrics, MetricsSnapshot};

struct Inner {
    config: EngineConfig,
    pool: rayon::ThreadPool,
    admission: Arc<AdmissionCounter>,
    metrics: Arc<EngineMetrics>,
}

/// Launches work under a [`Policy`] and hands back a [`Handle`].
///
/// Cheap to clone; clones share the worker pool, admission counter and metrics.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.inner.pool.current_num_threads())
            .field("admission_limit", &self.inner.admission.limit())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with its own admission counter sized from `config`.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let admission = AdmissionCounter::new(config.resolved_admission_limit());
        Self::with_admission(config, admission)
    }

    /// Create a scheduler that shares an existing admission counter.
    pub fn with_admission(config: EngineConfig, admission: Arc<AdmissionCounter>) -> EngineResult<Self> {
        let num_workers = config.resolved_worker_threads();
        let prefix = config.thread_name_prefix.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| EngineError::Pool(e.to_string()))?;

        info!(
            "Scheduler starting with {} workers, admission limit {}",
            num_workers,
            admission.limit()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                pool,
                admission,
                metrics: Arc::new(EngineMetrics::default()),
            }),
        })
    }

    /// Launch `work` under `policy`.
    ///
    /// `Immediate` runs the work before returning and never catches panics.
    /// `Deferred` runs it on the first observer. `Async` queues it on the
    /// pool. `AsyncOrDeferred` queues it only if the admission counter grants
    /// a slot, which is released when the work finishes.
    pub fn spawn<R, F>(&self, policy: Policy, work: F) -> Handle<R>
    where
        R: Send + 'static,
        F: FnOnce() -> EngineResult<R> + Send + 'static,
    {
        match policy {
            Policy::Immediate => {
                self.inner.metrics.record_spawn(Policy::Immediate);
                Handle::ready(work())
            }
            Policy::Deferred => self.defer(Box::new(work)),
            Policy::Async => self.launch_async(Box::new(work)),
            Policy::AsyncOrDeferred => match self.inner.admission.try_acquire() {
                Some(permit) => self.launch_async(Box::new(move || {
                    let _permit = permit;
                    work()
                })),
                None => {
                    trace!(
                        in_flight = self.inner.admission.in_flight(),
                        "admission limit reached, deferring"
                    );
                    self.inner.metrics.record_demotion();
                    self.defer(Box::new(work))
                }
            },
        }
    }

    fn defer<R: Send + 'static>(&self, job: Job<R>) -> Handle<R> {
        self.inner.metrics.record_spawn(Policy::Deferred);
        Handle::queued(job, Origin::Deferred, Some(Arc::clone(&self.inner.metrics)))
    }

    fn launch_async<R: Send + 'static>(&self, job: Job<R>) -> Handle<R> {
        self.inner.metrics.record_spawn(Policy::Async);
        let handle = Handle::queued(job, Origin::Pool, Some(Arc::clone(&self.inner.metrics)));
        let shared = handle.shared();
        self.inner.pool.spawn(move || {
            shared.try_run(true);
        });
        handle
    }

    /// Get a snapshot of the current engine metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Get an Arc to the metrics (for recording without going through the scheduler).
    pub fn metrics_handle(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub(crate) fn metrics_ref(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    pub fn admission(&self) -> &Arc<AdmissionCounter> {
        &self.inner.admission
    }

    pub fn worker_threads(&self) -> usize {
        self.inner.pool.current_num_threads()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn scheduler(workers: usize, admission: usize) -> Scheduler {
        Scheduler::new(EngineConfig {
            worker_threads: workers,
            admission_limit: admission,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn scheduler_creation() {
        let s = scheduler(3, 5);
        assert_eq!(s.worker_threads(), 3);
        assert_eq!(s.admission().limit(), 5);
        assert_eq!(s.metrics().total_spawned(), 0);
    }

    #[test]
    fn immediate_completes_before_return() {
        let s = scheduler(2, 2);
        let h = s.spawn(Policy::Immediate, || Ok(5));
        assert!(h.is_resolved());
        assert_eq!(h.get().unwrap(), 5);
        assert_eq!(s.metrics().immediate, 1);
    }

    #[test]
    fn deferred_waits_for_observer() {
        let s = scheduler(2, 2);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let h = s.spawn(Policy::Deferred, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        h.wait();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn async_runs_without_observer() {
        let s = scheduler(2, 2);
        let (tx, rx) = std::sync::mpsc::channel();
        let _h = s.spawn(Policy::Async, move || {
            tx.send(thread::current().name().map(str::to_string)).ok();
            Ok(())
        });
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(name.unwrap_or_default().starts_with("inncabs-worker"));
    }

    #[test]
    fn async_runs_concurrently_with_spawner() {
        let s = scheduler(2, 2);
        let barrier = Arc::new(Barrier::new(2));
        let b = Arc::clone(&barrier);
        let h = s.spawn(Policy::Async, move || {
            b.wait();
            Ok(1)
        });
        // Would deadlock if the work only ran when observed.
        barrier.wait();
        assert_eq!(h.into_result().unwrap(), 1);
    }

    #[test]
    fn async_failure_reraised_on_get() {
        let s = scheduler(2, 2);
        let h: Handle<u32> = s.spawn(Policy::Async, || Err(EngineError::failed("bad step")));
        assert_eq!(h.get(), Err(EngineError::failed("bad step")));
    }

    #[test]
    fn adaptive_demotes_when_full() {
        let s = scheduler(2, 1);
        let gate = Arc::new(Barrier::new(2));
        let g = Arc::clone(&gate);
        let first = s.spawn(Policy::AsyncOrDeferred, move || {
            g.wait();
            Ok(1)
        });
        // The first spawn holds the only slot until the barrier releases.
        let second = s.spawn(Policy::AsyncOrDeferred, || Ok(2));
        let snap = s.metrics();
        assert_eq!(snap.async_spawned, 1);
        assert_eq!(snap.deferred, 1);
        assert_eq!(snap.demoted, 1);

        gate.wait();
        assert_eq!(first.into_result().unwrap(), 1);
        assert_eq!(second.into_result().unwrap(), 2);
    }

    #[test]
    fn adaptive_releases_slot_on_completion() {
        let s = scheduler(2, 1);
        let h = s.spawn(Policy::AsyncOrDeferred, || Ok(()));
        h.wait();
        // Release happens as the work closure returns; allow the worker to finish.
        for _ in 0..100 {
            if s.admission().in_flight() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(s.admission().in_flight(), 0);
    }

    #[test]
    fn shared_admission_counter() {
        let counter = AdmissionCounter::new(4);
        let a = Scheduler::with_admission(EngineConfig::default(), Arc::clone(&counter)).unwrap();
        let b = Scheduler::with_admission(EngineConfig::default(), Arc::clone(&counter)).unwrap();
        assert!(Arc::ptr_eq(a.admission(), b.admission()));
    }
}
