//! Dining philosophers around a round table.
//!
//! Every diner repeatedly picks up both neighbouring forks and eats for a
//! random 1-10 ms until it has eaten for `full`. Forks are plain mutexes
//! acquired through [`lock_ordered`], so two diners reaching for the same
//! pair always lock it in the same order.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use inncabs_bench::Benchmark;
use inncabs_engine::{barrier_join, lock_ordered, EngineError, EngineResult, Policy, Scheduler};
use rand::Rng;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Philosopher {
    seat: usize,
    left: usize,
    right: usize,
    eaten: Duration,
}

impl Philosopher {
    pub fn eaten(&self) -> Duration {
        self.eaten
    }

    fn eat_duration(&self, full: Duration, rng: &mut impl Rng) -> Duration {
        let ms = Duration::from_millis(rng.gen_range(1..=10));
        ms.min(full.saturating_sub(self.eaten))
    }

    /// Eat until full. Returns the number of meals.
    pub fn dine(&mut self, forks: &[Mutex<u64>], full: Duration) -> EngineResult<u64> {
        let mut rng = rand::thread_rng();
        let mut meals = 0;
        while self.eaten < full {
            let d = self.eat_duration(full, &mut rng);
            let mut held = lock_ordered(vec![(self.left, &forks[self.left]), (self.right, &forks[self.right])])?;
            for fork in [self.left, self.right] {
                if let Some(uses) = held.get_mut(&fork) {
                    *uses += 1;
                }
            }
            let end = Instant::now() + d;
            while Instant::now() < end {
                std::hint::spin_loop();
            }
            drop(held);
            self.eaten += d;
            meals += 1;
        }
        trace!(seat = self.seat, meals, "philosopher is full");
        Ok(meals)
    }
}

/// `n` diners; diner `i` shares fork `i` with its left and fork `i + 1` with
/// its right neighbour, wrapping around.
pub fn seat(n: usize) -> Vec<Philosopher> {
    (0..n)
        .map(|i| Philosopher {
            seat: i,
            left: i,
            right: if i + 1 < n { i + 1 } else { 0 },
            eaten: Duration::ZERO,
        })
        .collect()
}

/// Outcome of one dinner.
#[derive(Debug, Clone)]
pub struct Dinner {
    pub diners: Vec<Philosopher>,
    /// Times each fork was picked up.
    pub fork_uses: Vec<u64>,
}

pub fn run(scheduler: &Scheduler, policy: Policy, n: usize, full: Duration) -> EngineResult<Dinner> {
    if n == 0 {
        return Err(EngineError::InvalidInput("need at least one philosopher".into()));
    }
    let forks: Arc<Vec<Mutex<u64>>> = Arc::new((0..n).map(|_| Mutex::new(0)).collect());
    let diners: Vec<Arc<Mutex<Philosopher>>> = seat(n).into_iter().map(|p| Arc::new(Mutex::new(p))).collect();

    let handles = diners
        .iter()
        .map(|diner| {
            let diner = Arc::clone(diner);
            let forks = Arc::clone(&forks);
            scheduler.spawn(policy, move || {
                let mut diner = diner
                    .lock()
                    .map_err(|_| EngineError::LockPoisoned("philosopher".into()))?;
                diner.dine(&forks, full).map(drop)
            })
        })
        .collect();
    barrier_join(handles)?;

    let diners = diners
        .iter()
        .map(|d| {
            d.lock()
                .map(|p| p.clone())
                .map_err(|_| EngineError::LockPoisoned("philosopher".into()))
        })
        .collect::<EngineResult<Vec<_>>>()?;
    let fork_uses = forks
        .iter()
        .map(|f| {
            f.lock()
                .map(|uses| *uses)
                .map_err(|_| EngineError::LockPoisoned("fork".into()))
        })
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(Dinner { diners, fork_uses })
}

pub struct PhilosophersBenchmark {
    pub n: usize,
    pub full: Duration,
}

impl Benchmark for PhilosophersBenchmark {
    type Output = Dinner;

    fn name(&self) -> String {
        format!("Dining Philosophers (N = {})", self.n)
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<Dinner> {
        run(scheduler, policy, self.n, self.full)
    }

    fn check(&self, output: &Dinner) -> bool {
        output.diners.len() == self.n && output.diners.iter().all(|d| d.eaten() >= self.full)
    }
}

#[cfg(test)]
mod tests {
    use inncabs_core::EngineConfig;

    use super::*;

    #[test]
    fn table_wraps_around() {
        let table = seat(3);
        assert_eq!((table[0].left, table[0].right), (0, 1));
        assert_eq!((table[2].left, table[2].right), (2, 0));

        let alone = seat(1);
        assert_eq!((alone[0].left, alone[0].right), (0, 0));
    }

    #[test]
    fn last_meal_is_capped() {
        let mut p = seat(2).remove(0);
        p.eaten = Duration::from_millis(9);
        let d = p.eat_duration(Duration::from_millis(10), &mut rand::thread_rng());
        assert_eq!(d, Duration::from_millis(1));
    }

    #[test]
    fn everyone_gets_full() {
        let scheduler = Scheduler::new(EngineConfig {
            worker_threads: 2,
            ..EngineConfig::default()
        })
        .unwrap();
        let full = Duration::from_millis(5);
        for policy in Policy::ALL {
            let dinner = run(&scheduler, policy, 4, full).unwrap();
            assert!(dinner.diners.iter().all(|d| d.eaten() == full), "{}", policy);
            let meals: u64 = dinner.fork_uses.iter().sum();
            assert!(meals >= 8, "each meal uses two forks");
        }
    }

    #[test]
    fn empty_table_is_rejected() {
        let scheduler = Scheduler::new(EngineConfig::default()).unwrap();
        assert!(matches!(
            run(&scheduler, Policy::Async, 0, Duration::from_millis(1)),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
