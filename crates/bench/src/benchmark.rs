use inncabs_engine::{EngineResult, Policy, Scheduler};

/// A kernel the harness can time and verify.
pub trait Benchmark {
    type Output;

    /// Title printed in the report header, e.g. `Fibonacci N=12`.
    fn name(&self) -> String;

    /// Reset state before each timed trial. Not included in the timing.
    fn initialize(&mut self) {}

    /// Run the kernel once under `policy`.
    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<Self::Output>;

    /// Verify the output of the trial that just ran.
    fn check(&self, output: &Self::Output) -> bool;
}
