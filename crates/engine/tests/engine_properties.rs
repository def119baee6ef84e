use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use inncabs_core::EngineConfig;
use inncabs_engine::{
    BestKnown, Driver, EngineError, EngineResult, Policy, RecursiveTask, Scheduler, Step,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn scheduler() -> Scheduler {
    Scheduler::new(EngineConfig {
        worker_threads: 4,
        admission_limit: 4,
        ..EngineConfig::default()
    })
    .unwrap()
}

struct Fib;

impl RecursiveTask for Fib {
    type Input = u64;
    type Output = u64;

    fn name(&self) -> &str {
        "fib"
    }

    fn is_base_case(&self, n: &u64) -> bool {
        *n < 2
    }

    fn base_case(&self, n: u64) -> EngineResult<u64> {
        Ok(n)
    }

    fn decompose(&self, n: u64, step: &Step<'_, Self>) -> EngineResult<u64> {
        let handles = vec![step.spawn(n - 1), step.spawn(n - 2)];
        step.fold(handles, 0, |a, b| a + b)
    }
}

#[test]
fn base_case_matches_under_every_policy() {
    let s = scheduler();
    for policy in Policy::ALL {
        let driver = Driver::new(Fib, s.clone(), policy);
        assert_eq!(driver.run(1).get().unwrap(), 1, "{}", policy);
        assert_eq!(driver.run(0).get().unwrap(), 0, "{}", policy);
    }
}

#[test]
fn fib_ten_is_55_under_every_policy() {
    let s = scheduler();
    for policy in Policy::ALL {
        let result = Driver::new(Fib, s.clone(), policy).run(10).get().unwrap();
        assert_eq!(result, 55, "policy {}", policy);
    }
}

#[test]
fn policies_agree_on_deeper_tree() {
    let s = scheduler();
    let results: Vec<u64> = Policy::ALL
        .iter()
        .map(|&p| Driver::new(Fib, s.clone(), p).run_sync(20).unwrap())
        .collect();
    assert!(results.iter().all(|&r| r == 6765), "{:?}", results);
}

/// Counts N-Queens placements; children are filtered for validity before spawn.
struct Queens {
    n: usize,
}

impl RecursiveTask for Queens {
    type Input = Vec<usize>;
    type Output = u64;

    fn name(&self) -> &str {
        "queens"
    }

    fn is_base_case(&self, placed: &Vec<usize>) -> bool {
        placed.len() == self.n
    }

    fn base_case(&self, _: Vec<usize>) -> EngineResult<u64> {
        Ok(1)
    }

    fn decompose(&self, placed: Vec<usize>, step: &Step<'_, Self>) -> EngineResult<u64> {
        let row = placed.len();
        let handles = (0..self.n)
            .filter(|&col| {
                placed
                    .iter()
                    .enumerate()
                    .all(|(r, &c)| c != col && row - r != col.abs_diff(c))
            })
            .map(|col| {
                let mut next = placed.clone();
                next.push(col);
                step.spawn(next)
            })
            .collect();
        step.fold(handles, 0, |a, b| a + b)
    }
}

#[test]
fn four_queens_has_two_solutions_under_every_policy() {
    let s = scheduler();
    for policy in Policy::ALL {
        let count = Driver::new(Queens { n: 4 }, s.clone(), policy)
            .run_sync(Vec::new())
            .unwrap();
        assert_eq!(count, 2, "policy {}", policy);
    }
}

/// Uneven tree whose size is the same however siblings are joined.
struct Subtree;

impl RecursiveTask for Subtree {
    type Input = u32;
    type Output = u64;

    fn name(&self) -> &str {
        "subtree"
    }

    fn is_base_case(&self, n: &u32) -> bool {
        *n == 0
    }

    fn base_case(&self, _: u32) -> EngineResult<u64> {
        Ok(1)
    }

    fn decompose(&self, n: u32, step: &Step<'_, Self>) -> EngineResult<u64> {
        let mut children: Vec<u32> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(u64::from(n) * 31 + step.depth() as u64);
        children.shuffle(&mut rng);
        let handles = children.into_iter().map(|c| step.spawn(c)).collect();
        step.fold_shuffled(handles, 1, |a, b| a + b, &mut rng)
    }
}

#[test]
fn shuffled_join_order_does_not_change_size() {
    let s = scheduler();
    // A node labelled n has children 0..n, so its subtree holds 2^n nodes.
    for policy in Policy::ALL {
        let size = Driver::new(Subtree, s.clone(), policy).run_sync(10).unwrap();
        assert_eq!(size, 1024, "policy {}", policy);
    }
}

/// Spawns `width` leaves; leaf `fail_at` fails.
struct OneBad {
    width: u32,
    fail_at: u32,
}

impl RecursiveTask for OneBad {
    type Input = Option<u32>;
    type Output = u32;

    fn name(&self) -> &str {
        "one-bad"
    }

    fn is_base_case(&self, leaf: &Option<u32>) -> bool {
        leaf.is_some()
    }

    fn base_case(&self, leaf: Option<u32>) -> EngineResult<u32> {
        match leaf {
            Some(i) if i == self.fail_at => Err(EngineError::failed(format!("leaf {}", i))),
            Some(i) => Ok(i),
            None => Ok(0),
        }
    }

    fn decompose(&self, _: Option<u32>, step: &Step<'_, Self>) -> EngineResult<u32> {
        let handles = (0..self.width).map(|i| step.spawn(Some(i))).collect();
        step.fold(handles, 0, |a, b| a + b)
    }
}

#[test]
fn single_failing_sibling_propagates_to_parent() {
    let s = scheduler();
    for policy in Policy::ALL {
        for fail_at in [0, 3, 7] {
            let driver = Driver::new(OneBad { width: 8, fail_at }, s.clone(), policy);
            assert_eq!(
                driver.run(None).get(),
                Err(EngineError::failed(format!("leaf {}", fail_at))),
                "policy {} fail_at {}",
                policy,
                fail_at
            );
        }
    }
}

#[test]
fn deferred_work_runs_once_under_concurrent_get() {
    let s = scheduler();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let handle = s.spawn(Policy::Deferred, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        Ok(99u32)
    });

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let h = handle.clone();
            thread::spawn(move || h.get())
        })
        .collect();
    for r in readers {
        assert_eq!(r.join().unwrap().unwrap(), 99);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// Two branches offer candidate scores to a shared minimum. With a gate the
/// branches wait for each other before offering, so both offers race.
struct Candidates {
    best: BestKnown,
    scores: Vec<i64>,
    gate: Option<Barrier>,
    threads: Mutex<HashSet<ThreadId>>,
}

impl Candidates {
    fn new(scores: Vec<i64>, gated: bool) -> Self {
        Self {
            best: BestKnown::new(i64::MAX),
            gate: gated.then(|| Barrier::new(scores.len())),
            scores,
            threads: Mutex::new(HashSet::new()),
        }
    }
}

impl RecursiveTask for Candidates {
    type Input = Option<usize>;
    type Output = ();

    fn name(&self) -> &str {
        "candidates"
    }

    fn is_base_case(&self, branch: &Option<usize>) -> bool {
        branch.is_some()
    }

    fn base_case(&self, branch: Option<usize>) -> EngineResult<()> {
        if let Some(i) = branch {
            if let Ok(mut threads) = self.threads.lock() {
                threads.insert(thread::current().id());
            }
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            self.best.offer(self.scores[i]);
        }
        Ok(())
    }

    fn decompose(&self, _: Option<usize>, step: &Step<'_, Self>) -> EngineResult<()> {
        let handles = (0..self.scores.len()).map(|i| step.spawn(Some(i))).collect();
        step.barrier(handles)
    }
}

#[test]
fn shared_best_keeps_minimum_of_siblings() {
    let s = scheduler();
    for policy in Policy::ALL {
        let driver = Driver::new(Candidates::new(vec![50, 30], false), s.clone(), policy);
        driver.run_sync(None).unwrap();
        assert_eq!(driver.task().best.get(), 30, "policy {}", policy);
    }
}

#[test]
fn concurrent_offers_keep_minimum() {
    let s = scheduler();
    for _ in 0..20 {
        let driver = Driver::new(Candidates::new(vec![50, 30], true), s.clone(), Policy::Async);
        driver.run_sync(None).unwrap();
        assert_eq!(driver.task().best.get(), 30);
        assert_eq!(driver.task().threads.lock().unwrap().len(), 2);
    }
}

/// Root spawns `width` leaves that each count their own execution.
struct Leaves {
    width: usize,
    observe: usize,
    ran: AtomicUsize,
    before_get: AtomicUsize,
}

impl RecursiveTask for Leaves {
    type Input = Option<usize>;
    type Output = usize;

    fn name(&self) -> &str {
        "leaves"
    }

    fn is_base_case(&self, leaf: &Option<usize>) -> bool {
        leaf.is_some()
    }

    fn base_case(&self, _: Option<usize>) -> EngineResult<usize> {
        thread::sleep(Duration::from_millis(5));
        self.ran.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    fn decompose(&self, _: Option<usize>, step: &Step<'_, Self>) -> EngineResult<usize> {
        let mut handles: Vec<_> = (0..self.width).map(|i| step.spawn(Some(i))).collect();
        self.before_get.store(self.ran.load(Ordering::SeqCst), Ordering::SeqCst);
        handles.truncate(self.observe);
        step.fold(handles, 0, |a, b| a + b)
    }
}

#[test]
fn deferred_children_wait_for_observation() {
    let s = scheduler();
    let driver = Driver::new(
        Leaves {
            width: 4,
            observe: 2,
            ran: AtomicUsize::new(0),
            before_get: AtomicUsize::new(0),
        },
        s.clone(),
        Policy::Deferred,
    );
    assert_eq!(driver.run_sync(None).unwrap(), 2);
    assert_eq!(driver.task().before_get.load(Ordering::SeqCst), 0);
    assert_eq!(driver.task().ran.load(Ordering::SeqCst), 2);
    assert_eq!(s.metrics().abandoned, 2);
}

#[test]
fn async_leaves_run_on_several_workers() {
    let s = scheduler();
    let driver = Driver::new(Candidates::new(vec![3, 2, 1], true), s, Policy::Async);
    driver.run_sync(None).unwrap();
    assert_eq!(driver.task().best.get(), 1);
    assert_eq!(driver.task().threads.lock().unwrap().len(), 3);
}

#[test]
fn unobserved_deferred_handle_does_not_block_shutdown() {
    let s = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    let handle = s.spawn(Policy::Deferred, move || {
        flag.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    drop(handle);
    drop(s.clone());

    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(s.metrics().abandoned, 1);
}
