//! Branch-and-bound quadratic assignment.
//!
//! Plants are assigned to locations one at a time. Branches whose partial cost
//! already reaches the best complete assignment found so far are pruned; the
//! bound is a [`BestKnown`] shared by every branch of the search.

use std::path::Path;
use std::sync::Arc;

use inncabs_bench::Benchmark;
use inncabs_core::{InputError, InputResult, Tokens};
use inncabs_engine::{BestKnown, Driver, EngineError, EngineResult, Policy, RecursiveTask, Scheduler, Step};
use tracing::info;

/// Initial bound, larger than any realistic assignment cost.
const UNBOUNDED: i64 = 1 << 30;

/// Upper limit imposed by the bitmask of used locations.
pub const MAX_SIZE: usize = 64;

/// A problem instance: flow matrix `a`, distance matrix `b` and the known optimum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QapProblem {
    size: usize,
    a: Vec<i64>,
    b: Vec<i64>,
    pub optimum: i64,
}

impl QapProblem {
    pub fn new(size: usize, a: Vec<i64>, b: Vec<i64>, optimum: i64) -> InputResult<Self> {
        if size == 0 || size > MAX_SIZE {
            return Err(InputError::Parse {
                line: 1,
                message: format!("problem size {} outside 1..={}", size, MAX_SIZE),
            });
        }
        if a.len() != size * size || b.len() != size * size {
            return Err(InputError::Missing(format!("{}x{} matrix entries", size, size)));
        }
        Ok(Self { size, a, b, optimum })
    }

    /// Parse `size`, then `size*size` entries of A, then of B, then the optimum.
    pub fn parse(text: &str) -> InputResult<Self> {
        let mut t = Tokens::new(text);
        let size: usize = t.next("problem size")?;
        if size == 0 || size > MAX_SIZE {
            return Self::new(size, Vec::new(), Vec::new(), 0);
        }
        let mut read_matrix = |name: &str| -> InputResult<Vec<i64>> {
            (0..size * size)
                .map(|i| t.next(&format!("{}[{}][{}]", name, i / size, i % size)))
                .collect()
        };
        let a = read_matrix("A")?;
        let b = read_matrix("B")?;
        let optimum = t.next("optimum")?;
        Self::new(size, a, b, optimum)
    }

    pub fn load(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        let problem = Self::parse(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded QAP problem {} (size {}, optimum {})",
            path.display(),
            problem.size,
            problem.optimum
        );
        Ok(problem)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn a(&self, i: usize, j: usize) -> i64 {
        self.a[i * self.size + j]
    }

    fn b(&self, i: usize, j: usize) -> i64 {
        self.b[i * self.size + j]
    }

    /// Cost added by putting plant `assigned.len()` at `location`, against
    /// itself and every plant already placed.
    fn extension_cost(&self, assigned: &[usize], location: usize) -> i64 {
        let plant = assigned.len();
        let own = self.a(plant, plant) * self.b(location, location) * 2;
        own + assigned
            .iter()
            .enumerate()
            .map(|(other, &pos)| {
                self.a(plant, other) * self.b(location, pos) + self.a(other, plant) * self.b(pos, location)
            })
            .sum::<i64>()
    }

    /// Total cost of a complete assignment, for verification.
    pub fn cost(&self, assignment: &[usize]) -> i64 {
        (0..assignment.len())
            .map(|i| self.extension_cost(&assignment[..i], assignment[i]))
            .sum()
    }
}

/// A partial assignment: location per already placed plant.
#[derive(Debug, Clone)]
pub struct Partial {
    assigned: Vec<usize>,
    used: u64,
    cost: i64,
}

impl Partial {
    fn empty() -> Self {
        Self {
            assigned: Vec::new(),
            used: 0,
            cost: 0,
        }
    }
}

pub struct Qap {
    problem: Arc<QapProblem>,
    best: BestKnown,
}

impl Qap {
    pub fn new(problem: Arc<QapProblem>) -> Self {
        Self {
            problem,
            best: BestKnown::new(UNBOUNDED),
        }
    }

    pub fn best(&self) -> i64 {
        self.best.get()
    }
}

impl RecursiveTask for Qap {
    type Input = Partial;
    type Output = i64;

    fn name(&self) -> &str {
        "qap"
    }

    fn is_base_case(&self, p: &Partial) -> bool {
        p.assigned.len() >= self.problem.size
    }

    fn base_case(&self, p: Partial) -> EngineResult<i64> {
        Ok(p.cost)
    }

    fn decompose(&self, p: Partial, step: &Step<'_, Self>) -> EngineResult<i64> {
        if !self.best.improves(p.cost) {
            return Ok(self.best.get());
        }
        let handles = (0..self.problem.size)
            .filter(|&loc| p.used & (1u64 << loc) == 0)
            .map(|loc| {
                let mut assigned = p.assigned.clone();
                let cost = p.cost + self.problem.extension_cost(&assigned, loc);
                assigned.push(loc);
                step.spawn(Partial {
                    assigned,
                    used: p.used | (1u64 << loc),
                    cost,
                })
            })
            .collect();
        step.fold(handles, (), |(), candidate| {
            self.best.offer(candidate);
        })?;
        Ok(self.best.get())
    }
}

pub fn run(scheduler: &Scheduler, policy: Policy, problem: Arc<QapProblem>) -> EngineResult<i64> {
    let driver = Driver::new(Qap::new(problem), scheduler.clone(), policy);
    let result = driver.run_sync(Partial::empty())?;
    if result >= UNBOUNDED {
        return Err(EngineError::failed("search finished without a complete assignment"));
    }
    Ok(result)
}

pub struct QapBenchmark {
    label: String,
    problem: Arc<QapProblem>,
}

impl QapBenchmark {
    pub fn new(label: impl Into<String>, problem: QapProblem) -> Self {
        Self {
            label: label.into(),
            problem: Arc::new(problem),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> InputResult<Self> {
        let path = path.as_ref();
        Ok(Self::new(path.display().to_string(), QapProblem::load(path)?))
    }
}

impl Benchmark for QapBenchmark {
    type Output = i64;

    fn name(&self) -> String {
        format!("Quadratic Assignment Solver ({})", self.label)
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<i64> {
        run(scheduler, policy, Arc::clone(&self.problem))
    }

    fn check(&self, output: &i64) -> bool {
        *output == self.problem.optimum
    }
}
