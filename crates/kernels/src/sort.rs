//! Parallel merge sort in the cilksort style.
//!
//! A range is split into four quarters that are sorted independently, merged
//! pairwise and then merged once more. Merges recurse too: the middle element
//! of the larger run splits it, a binary search splits the smaller run at the
//! same value, and both halves merge independently. Short ranges fall back to
//! quicksort, very short ones to insertion sort, short merges to a linear merge.

use inncabs_bench::Benchmark;
use inncabs_engine::{Driver, EngineError, EngineResult, Policy, RecursiveTask, Scheduler, Step};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

const INPUT_SEED: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortParams {
    pub size: usize,
    /// Merges whose smaller run is shorter than this are sequential.
    pub merge_cutoff: usize,
    /// Ranges shorter than this are quicksorted sequentially.
    pub quick_cutoff: usize,
    /// Ranges shorter than this are insertion sorted.
    pub insertion_cutoff: usize,
}

impl Default for SortParams {
    fn default() -> Self {
        Self {
            size: 10_000,
            merge_cutoff: 512,
            quick_cutoff: 512,
            insertion_cutoff: 128,
        }
    }
}

impl SortParams {
    /// Bring the cutoffs into a consistent range for `size`.
    pub fn clamped(self) -> Self {
        let size = self.size.max(4);
        let merge_cutoff = self.merge_cutoff.clamp(2, size);
        let quick_cutoff = self.quick_cutoff.clamp(4, size);
        let insertion_cutoff = self.insertion_cutoff.min(quick_cutoff);
        Self {
            size,
            merge_cutoff,
            quick_cutoff,
            insertion_cutoff,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SortStep {
    Sort(Vec<i64>),
    Merge(Vec<i64>, Vec<i64>),
}

pub struct Cilksort {
    params: SortParams,
}

impl Cilksort {
    pub fn new(params: SortParams) -> Self {
        Self {
            params: params.clamped(),
        }
    }
}

impl RecursiveTask for Cilksort {
    type Input = SortStep;
    type Output = Vec<i64>;

    fn name(&self) -> &str {
        "sort"
    }

    fn is_base_case(&self, input: &SortStep) -> bool {
        match input {
            SortStep::Sort(v) => v.len() < self.params.quick_cutoff,
            SortStep::Merge(a, b) => a.len().min(b.len()) < self.params.merge_cutoff,
        }
    }

    fn base_case(&self, input: SortStep) -> EngineResult<Vec<i64>> {
        Ok(match input {
            SortStep::Sort(mut v) => {
                quicksort(&mut v, self.params.insertion_cutoff);
                v
            }
            SortStep::Merge(a, b) => merge(&a, &b),
        })
    }

    fn decompose(&self, input: SortStep, step: &Step<'_, Self>) -> EngineResult<Vec<i64>> {
        match input {
            SortStep::Sort(v) => {
                let quarter = v.len() / 4;
                let handles = (0..4)
                    .map(|k| {
                        let hi = if k == 3 { v.len() } else { (k + 1) * quarter };
                        step.spawn(SortStep::Sort(v[k * quarter..hi].to_vec()))
                    })
                    .collect();
                let [a, b, c, d] = runs(step.collect(handles)?)?;
                let halves = vec![step.spawn(SortStep::Merge(a, b)), step.spawn(SortStep::Merge(c, d))];
                let [lo, hi] = runs(step.collect(halves)?)?;
                step.spawn(SortStep::Merge(lo, hi)).into_result()
            }
            SortStep::Merge(a, b) => {
                let (large, small) = if a.len() >= b.len() { (a, b) } else { (b, a) };
                let mid = large.len() / 2;
                let pivot = large[mid];
                let split = small.partition_point(|&x| x <= pivot);
                let handles = vec![
                    step.spawn(SortStep::Merge(large[..mid].to_vec(), small[..split].to_vec())),
                    step.spawn(SortStep::Merge(large[mid + 1..].to_vec(), small[split..].to_vec())),
                ];
                let [mut out, hi] = runs(step.collect(handles)?)?;
                out.push(pivot);
                out.extend(hi);
                Ok(out)
            }
        }
    }
}

fn runs<const N: usize>(sorted: Vec<Vec<i64>>) -> EngineResult<[Vec<i64>; N]> {
    sorted
        .try_into()
        .map_err(|v: Vec<Vec<i64>>| EngineError::failed(format!("expected {} sorted runs, got {}", N, v.len())))
}

fn insertion_sort(v: &mut [i64]) {
    for i in 1..v.len() {
        let mut j = i;
        while j > 0 && v[j - 1] > v[j] {
            v.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Median-of-three Lomuto partition; returns the pivot's final index.
fn partition(v: &mut [i64]) -> usize {
    let last = v.len() - 1;
    let mid = last / 2;
    if v[mid] < v[0] {
        v.swap(mid, 0);
    }
    if v[last] < v[0] {
        v.swap(last, 0);
    }
    if v[mid] < v[last] {
        v.swap(mid, last);
    }
    let pivot = v[last];
    let mut store = 0;
    for i in 0..last {
        if v[i] < pivot {
            v.swap(i, store);
            store += 1;
        }
    }
    v.swap(store, last);
    store
}

fn quicksort(v: &mut [i64], insertion_cutoff: usize) {
    if v.len() < insertion_cutoff.max(2) {
        insertion_sort(v);
        return;
    }
    let p = partition(v);
    let (lo, hi) = v.split_at_mut(p);
    quicksort(lo, insertion_cutoff);
    quicksort(&mut hi[1..], insertion_cutoff);
}

fn merge(a: &[i64], b: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] <= b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// `0..size` in a fixed pseudo-random order.
pub fn shuffled_input(size: usize) -> Vec<i64> {
    let mut v: Vec<i64> = (0..size as i64).collect();
    v.shuffle(&mut StdRng::seed_from_u64(INPUT_SEED));
    v
}

/// Sorted and a permutation of `0..len`.
pub fn is_identity(v: &[i64]) -> bool {
    v.iter().enumerate().all(|(i, &x)| x == i as i64)
}

pub fn run(scheduler: &Scheduler, policy: Policy, params: SortParams, input: Vec<i64>) -> EngineResult<Vec<i64>> {
    Driver::new(Cilksort::new(params), scheduler.clone(), policy).run_sync(SortStep::Sort(input))
}

pub struct SortBenchmark {
    params: SortParams,
    input: Vec<i64>,
}

impl SortBenchmark {
    pub fn new(params: SortParams) -> Self {
        let params = params.clamped();
        debug!(?params, "sort parameters");
        Self {
            params,
            input: Vec::new(),
        }
    }
}

impl Benchmark for SortBenchmark {
    type Output = Vec<i64>;

    fn name(&self) -> String {
        format!(
            "Sort with N = {}, cutoffs = {} / {} / {}",
            self.params.size, self.params.merge_cutoff, self.params.quick_cutoff, self.params.insertion_cutoff
        )
    }

    fn initialize(&mut self) {
        self.input = shuffled_input(self.params.size);
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<Vec<i64>> {
        run(scheduler, policy, self.params, std::mem::take(&mut self.input))
    }

    fn check(&self, output: &Vec<i64>) -> bool {
        output.len() == self.params.size && is_identity(output)
    }
}

#[cfg(test)]
mod tests {
    use inncabs_core::EngineConfig;

    use super::*;

    #[test]
    fn cutoffs_are_clamped() {
        let p = SortParams {
            size: 2,
            merge_cutoff: 0,
            quick_cutoff: 100,
            insertion_cutoff: 50,
        }
        .clamped();
        assert_eq!(p.size, 4);
        assert_eq!(p.merge_cutoff, 2);
        assert_eq!(p.quick_cutoff, 4);
        assert_eq!(p.insertion_cutoff, 4);
    }

    #[test]
    fn sequential_pieces() {
        let mut v = shuffled_input(300);
        quicksort(&mut v, 16);
        assert!(is_identity(&v));

        let mut w = vec![3, 1, 2, 2, -5];
        insertion_sort(&mut w);
        assert_eq!(w, vec![-5, 1, 2, 2, 3]);

        assert_eq!(merge(&[1, 4, 9], &[2, 3, 10, 11]), vec![1, 2, 3, 4, 9, 10, 11]);
        assert_eq!(merge(&[], &[7]), vec![7]);
    }

    #[test]
    fn input_is_a_permutation() {
        let mut v = shuffled_input(100);
        assert!(!is_identity(&v));
        v.sort_unstable();
        assert!(is_identity(&v));
    }

    #[test]
    fn small_cutoffs_exercise_parallel_merge() {
        let scheduler = Scheduler::new(EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        })
        .unwrap();
        let params = SortParams {
            size: 1_000,
            merge_cutoff: 2,
            quick_cutoff: 8,
            insertion_cutoff: 4,
        };
        for policy in Policy::ALL {
            let sorted = run(&scheduler, policy, params, shuffled_input(1_000)).unwrap();
            assert!(is_identity(&sorted), "{}", policy);
        }
    }
}
