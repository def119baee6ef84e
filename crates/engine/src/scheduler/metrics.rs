use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;

use crate::policy::Policy;

/// Process-wide engine counters. Updated lock-free from any thread.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    immediate: AtomicU64,
    deferred: AtomicU64,
    async_spawned: AtomicU64,
    demoted: AtomicU64,
    inline_async: AtomicU64,
    base_cases: AtomicU64,
    steps_resolved: AtomicU64,
    steps_failed: AtomicU64,
    abandoned: AtomicU64,
    /// Completed root runs per kernel name.
    runs: RwLock<HashMap<String, RunStats>>,
}

/// Timing summary for one kernel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub count: u64,
    pub avg_duration: Duration,
    pub last_policy: Option<Policy>,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub immediate: u64,
    pub deferred: u64,
    pub async_spawned: u64,
    /// Adaptive spawns that fell back to deferred for lack of capacity.
    pub demoted: u64,
    /// Async work executed by its observer before a worker picked it up.
    pub inline_async: u64,
    pub base_cases: u64,
    pub steps_resolved: u64,
    pub steps_failed: u64,
    /// Deferred work dropped without ever being observed.
    pub abandoned: u64,
    pub runs: HashMap<String, RunStats>,
}

impl MetricsSnapshot {
    pub fn total_spawned(&self) -> u64 {
        self.immediate + self.deferred + self.async_spawned
    }
}

impl EngineMetrics {
    pub(crate) fn record_spawn(&self, mode: Policy) {
        let counter = match mode {
            Policy::Immediate => &self.immediate,
            Policy::Deferred => &self.deferred,
            Policy::Async | Policy::AsyncOrDeferred => &self.async_spawned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_demotion(&self) {
        self.demoted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inline_async(&self) {
        self.inline_async.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_base_case(&self) {
        self.base_cases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_step(&self, ok: bool) {
        let counter = if ok { &self.steps_resolved } else { &self.steps_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed root run.
    pub fn record_run(&self, name: &str, policy: Policy, duration: Duration) {
        let Ok(mut runs) = self.runs.write() else {
            return;
        };
        let stats = runs.entry(name.to_string()).or_default();
        stats.count += 1;
        stats.last_policy = Some(policy);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        stats.avg_duration = if stats.count == 1 {
            duration
        } else {
            let prev_nanos = stats.avg_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / stats.count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let runs = self.runs.read().map(|r| r.clone()).unwrap_or_default();
        MetricsSnapshot {
            immediate: self.immediate.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            async_spawned: self.async_spawned.load(Ordering::Relaxed),
            demoted: self.demoted.load(Ordering::Relaxed),
            inline_async: self.inline_async.load(Ordering::Relaxed),
            base_cases: self.base_cases.load(Ordering::Relaxed),
            steps_resolved: self.steps_resolved.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_run() {
        let m = EngineMetrics::default();
        m.record_run("fib", Policy::Async, Duration::from_millis(100));

        let snap = m.snapshot();
        assert_eq!(snap.runs["fib"].count, 1);
        assert_eq!(snap.runs["fib"].avg_duration, Duration::from_millis(100));
        assert_eq!(snap.runs["fib"].last_policy, Some(Policy::Async));
    }

    #[test]
    fn record_multiple_runs_averages() {
        let m = EngineMetrics::default();
        m.record_run("task", Policy::Deferred, Duration::from_millis(100));
        m.record_run("task", Policy::Deferred, Duration::from_millis(200));

        let snap = m.snapshot();
        assert_eq!(snap.runs["task"].count, 2);
        let avg = snap.runs["task"].avg_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn spawn_counters() {
        let m = EngineMetrics::default();
        m.record_spawn(Policy::Immediate);
        m.record_spawn(Policy::Deferred);
        m.record_spawn(Policy::Async);
        m.record_demotion();

        let snap = m.snapshot();
        assert_eq!(snap.total_spawned(), 3);
        assert_eq!(snap.demoted, 1);
        assert_eq!(snap.abandoned, 0);
    }
}
