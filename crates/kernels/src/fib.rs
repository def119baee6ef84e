use inncabs_bench::Benchmark;
use inncabs_engine::{Driver, EngineResult, Policy, RecursiveTask, Scheduler, Step};

/// Naive doubly recursive Fibonacci.
pub struct Fib;

impl RecursiveTask for Fib {
    type Input = u32;
    type Output = u64;

    fn name(&self) -> &str {
        "fib"
    }

    fn is_base_case(&self, n: &u32) -> bool {
        *n < 2
    }

    fn base_case(&self, n: u32) -> EngineResult<u64> {
        Ok(u64::from(n))
    }

    fn decompose(&self, n: u32, step: &Step<'_, Self>) -> EngineResult<u64> {
        let handles = vec![step.spawn(n - 1), step.spawn(n - 2)];
        step.fold(handles, 0, |a, b| a + b)
    }
}

pub fn run(scheduler: &Scheduler, policy: Policy, n: u32) -> EngineResult<u64> {
    Driver::new(Fib, scheduler.clone(), policy).run_sync(n)
}

/// Iterative reference value.
pub fn expected(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        (a, b) = (b, a + b);
    }
    a
}

pub struct FibBenchmark {
    pub n: u32,
}

impl Benchmark for FibBenchmark {
    type Output = u64;

    fn name(&self) -> String {
        format!("Fibonacci N={}", self.n)
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<u64> {
        run(scheduler, policy, self.n)
    }

    fn check(&self, output: &u64) -> bool {
        *output == expected(self.n)
    }
}
