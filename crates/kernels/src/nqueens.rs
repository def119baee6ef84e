use inncabs_bench::Benchmark;
use inncabs_engine::{Driver, EngineError, EngineResult, Policy, RecursiveTask, Scheduler, Step};

pub const DEFAULT_THRESHOLD: usize = 8;

/// Known solution counts for boards of size 1 through 21.
const SOLUTIONS: [u64; 21] = [
    1,
    0,
    0,
    2,
    10,
    4,
    40,
    92,
    352,
    724,
    2_680,
    14_200,
    73_712,
    365_596,
    2_279_184,
    14_772_512,
    95_815_104,
    666_090_624,
    4_968_057_848,
    39_029_188_884,
    314_666_222_712,
];

pub fn expected(n: usize) -> Option<u64> {
    n.checked_sub(1).and_then(|i| SOLUTIONS.get(i).copied())
}

/// Whether the queen in the last column of `history` is safe from the others.
fn valid(history: &[usize]) -> bool {
    let Some((&row, earlier)) = history.split_last() else {
        return true;
    };
    let col = earlier.len();
    earlier
        .iter()
        .enumerate()
        .all(|(c, &r)| r != row && col - c != row.abs_diff(r))
}

fn extensions(n: usize, history: &[usize]) -> impl Iterator<Item = Vec<usize>> + '_ {
    (0..n).filter_map(move |row| {
        let mut next = history.to_vec();
        next.push(row);
        valid(&next).then_some(next)
    })
}

fn count_sequential(n: usize, history: Vec<usize>) -> u64 {
    if history.len() == n {
        return 1;
    }
    extensions(n, &history)
        .map(|next| count_sequential(n, next))
        .sum()
}

/// Counts placements column by column. Each descriptor is the row history of
/// the columns placed so far. The last `threshold` columns are searched
/// sequentially.
pub struct NQueens {
    n: usize,
    threshold: usize,
}

impl NQueens {
    pub fn new(n: usize, threshold: usize) -> Self {
        Self { n, threshold }
    }
}

impl RecursiveTask for NQueens {
    type Input = Vec<usize>;
    type Output = u64;

    fn name(&self) -> &str {
        "nqueens"
    }

    fn is_base_case(&self, history: &Vec<usize>) -> bool {
        history.len() == self.n || history.len() + self.threshold > self.n
    }

    fn base_case(&self, history: Vec<usize>) -> EngineResult<u64> {
        Ok(count_sequential(self.n, history))
    }

    fn decompose(&self, history: Vec<usize>, step: &Step<'_, Self>) -> EngineResult<u64> {
        let handles = extensions(self.n, &history)
            .map(|next| step.spawn(next))
            .collect();
        step.fold(handles, 0, |sum, count| sum + count)
    }
}

pub fn run(scheduler: &Scheduler, policy: Policy, n: usize, threshold: usize) -> EngineResult<u64> {
    if n == 0 {
        return Err(EngineError::InvalidInput("board size must be positive".into()));
    }
    Driver::new(NQueens::new(n, threshold), scheduler.clone(), policy).run_sync(Vec::new())
}

pub struct NQueensBenchmark {
    pub n: usize,
    pub threshold: usize,
}

impl Benchmark for NQueensBenchmark {
    type Output = u64;

    fn name(&self) -> String {
        format!("N-Queens N={}", self.n)
    }

    fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<u64> {
        run(scheduler, policy, self.n, self.threshold)
    }

    fn check(&self, output: &u64) -> bool {
        expected(self.n) == Some(*output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_filter() {
        assert!(valid(&[]));
        assert!(valid(&[1, 3]));
        assert!(!valid(&[1, 1]));
        assert!(!valid(&[0, 1]));
        assert!(!valid(&[0, 3, 2]));
    }

    #[test]
    fn sequential_counts_match_table() {
        for n in 1..=8 {
            assert_eq!(Some(count_sequential(n, Vec::new())), expected(n), "n={}", n);
        }
    }

    #[test]
    fn table_bounds() {
        assert_eq!(expected(0), None);
        assert_eq!(expected(8), Some(92));
        assert_eq!(expected(22), None);
    }
}
