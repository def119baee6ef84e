use std::cell::Cell;
use std::sync::Arc;

use rand::Rng;
use tracing::trace;

use crate::descriptor::TaskDescriptor;
use crate::error::EngineResult;
use crate::handle::Handle;
use crate::join;
use crate::policy::Policy;
use crate::scheduler::Scheduler;

/// A divide-and-conquer kernel.
///
/// Every child is launched under the active policy; the launched step then
/// calls `is_base_case` and either resolves with `base_case` or hands the
/// input to `decompose`, which spawns children through the [`Step`] and joins
/// them exactly once. Only a root that is already a base case resolves on
/// the calling thread.
pub trait RecursiveTask: Send + Sync + Sized + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Human-readable name for logging and metrics.
    fn name(&self) -> &str;

    fn is_base_case(&self, input: &Self::Input) -> bool;

    fn base_case(&self, input: Self::Input) -> EngineResult<Self::Output>;

    fn decompose(&self, input: Self::Input, step: &Step<'_, Self>) -> EngineResult<Self::Output>;
}

/// Lifecycle of one decomposing invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Unevaluated,
    Decomposing,
    Joining,
    Resolved,
    Failed,
}

/// Binds a [`RecursiveTask`] to a scheduler and one policy for a whole call tree.
pub struct Driver<T: RecursiveTask> {
    task: Arc<T>,
    scheduler: Scheduler,
    policy: Policy,
}

impl<T: RecursiveTask> Clone for Driver<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            scheduler: self.scheduler.clone(),
            policy: self.policy,
        }
    }
}

impl<T: RecursiveTask> Driver<T> {
    pub fn new(task: T, scheduler: Scheduler, policy: Policy) -> Self {
        Self::from_arc(Arc::new(task), scheduler, policy)
    }

    pub fn from_arc(task: Arc<T>, scheduler: Scheduler, policy: Policy) -> Self {
        Self { task, scheduler, policy }
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Evaluate `input` as the root of a new call tree.
    pub fn run(&self, input: T::Input) -> Handle<T::Output> {
        trace!(task = self.task.name(), policy = %self.policy, "root call");
        let descriptor = TaskDescriptor::root(input);
        if self.task.is_base_case(descriptor.input()) {
            self.scheduler.metrics_ref().record_base_case();
            return Handle::ready(self.task.base_case(descriptor.into_input()));
        }
        self.launch(descriptor)
    }

    /// [`Driver::run`] and wait for the result.
    pub fn run_sync(&self, input: T::Input) -> EngineResult<T::Output> {
        self.run(input).into_result()
    }

    /// Launch a descriptor under the driver's policy. The base-case check
    /// happens inside the launched work.
    fn launch(&self, descriptor: TaskDescriptor<T::Input>) -> Handle<T::Output> {
        let driver = self.clone();
        self.scheduler
            .spawn(self.policy, move || driver.evaluate(descriptor))
    }

    /// Run a descriptor to completion on the current thread. Children it
    /// spawns still follow the driver's policy.
    fn evaluate(&self, descriptor: TaskDescriptor<T::Input>) -> EngineResult<T::Output> {
        if self.task.is_base_case(descriptor.input()) {
            self.scheduler.metrics_ref().record_base_case();
            return self.task.base_case(descriptor.into_input());
        }
        self.decompose(descriptor)
    }

    fn decompose(&self, descriptor: TaskDescriptor<T::Input>) -> EngineResult<T::Output> {
        let step = Step {
            driver: self,
            depth: descriptor.depth(),
            state: Cell::new(StepState::Unevaluated),
        };
        step.transition(StepState::Decomposing);
        let result = self.task.decompose(descriptor.into_input(), &step);
        let ok = result.is_ok();
        step.transition(if ok { StepState::Resolved } else { StepState::Failed });
        self.scheduler.metrics_ref().record_step(ok);
        result
    }
}

/// Context handed to [`RecursiveTask::decompose`].
///
/// Spawns children one level deeper under the driver's policy and joins
/// them. Join helpers move the step from `Decomposing` to `Joining`.
pub struct Step<'a, T: RecursiveTask> {
    driver: &'a Driver<T>,
    depth: usize,
    state: Cell<StepState>,
}

impl<'a, T: RecursiveTask> Step<'a, T> {
    fn transition(&self, next: StepState) {
        trace!(
            task = self.driver.task.name(),
            depth = self.depth,
            from = ?self.state.get(),
            to = ?next,
            "step transition"
        );
        self.state.set(next);
    }

    /// Spawn a child under the driver's policy.
    pub fn spawn(&self, input: T::Input) -> Handle<T::Output> {
        self.driver.launch(TaskDescriptor::child(input, self.depth))
    }

    /// Evaluate a child inline, e.g. below a sequential cutoff.
    pub fn sequential(&self, input: T::Input) -> EngineResult<T::Output> {
        self.driver.evaluate(TaskDescriptor::child(input, self.depth))
    }

    pub fn fold<R, A, F>(&self, handles: Vec<Handle<R>>, identity: A, combine: F) -> EngineResult<A>
    where
        F: FnMut(A, R) -> A,
    {
        self.transition(StepState::Joining);
        join::fold_join(handles, identity, combine)
    }

    pub fn fold_shuffled<R, A, F, G>(
        &self,
        handles: Vec<Handle<R>>,
        identity: A,
        combine: F,
        rng: &mut G,
    ) -> EngineResult<A>
    where
        F: FnMut(A, R) -> A,
        G: Rng + ?Sized,
    {
        self.transition(StepState::Joining);
        join::fold_join_shuffled(handles, identity, combine, rng)
    }

    pub fn collect<R>(&self, handles: Vec<Handle<R>>) -> EngineResult<Vec<R>> {
        self.transition(StepState::Joining);
        join::collect_join(handles)
    }

    pub fn barrier<R>(&self, handles: Vec<Handle<R>>) -> EngineResult<()> {
        self.transition(StepState::Joining);
        join::barrier_join(handles)
    }

    pub fn state(&self) -> StepState {
        self.state.get()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn policy(&self) -> Policy {
        self.driver.policy
    }

    pub fn task(&self) -> &T {
        &self.driver.task
    }
}
