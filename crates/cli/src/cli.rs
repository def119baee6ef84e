use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Task-parallel benchmark suite.
///
/// Runs one kernel under every launch type selected by
/// `INNCABS_LAUNCH_TYPES` and prints timing and verification results.
#[derive(Parser, Debug)]
#[command(name = "inncabs", about = "Task-parallel benchmark suite")]
pub struct CliArgs {
    /// TOML file with engine settings (worker_threads, admission_limit, thread_name_prefix)
    #[arg(long, env = "INNCABS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write the per-launch-type reports as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(subcommand)]
    pub kernel: Kernel,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Kernel {
    /// Naive recursive Fibonacci
    Fib {
        #[arg(default_value_t = 12)]
        n: u32,
    },
    /// Count N-Queens placements
    Nqueens {
        #[arg(default_value_t = 8)]
        n: usize,
        /// Columns left to place below which the search is sequential
        #[arg(default_value_t = 8)]
        threshold: usize,
    },
    /// Parallel merge sort of a shuffled range
    Sort {
        #[arg(default_value_t = 10_000)]
        size: usize,
        /// Sequential merge cutoff
        #[arg(default_value_t = 512)]
        merge_cutoff: usize,
        /// Sequential quicksort cutoff
        #[arg(default_value_t = 512)]
        quick_cutoff: usize,
        /// Insertion sort cutoff
        #[arg(default_value_t = 128)]
        insertion_cutoff: usize,
    },
    /// Interaction-net reduction of N*N
    Intersim {
        #[arg(default_value_t = 500)]
        n: u64,
    },
    /// Dining philosophers
    Philosophers {
        #[arg(default_value_t = 16)]
        n: usize,
        /// Milliseconds each philosopher has to eat
        #[arg(default_value_t = 50)]
        full_ms: u64,
    },
    /// Block-sparse LU factorization
    Sparselu {
        /// Blocks per matrix dimension
        #[arg(default_value_t = 50)]
        blocks: usize,
        /// Floats per block dimension
        #[arg(default_value_t = 100)]
        block_size: usize,
    },
    /// Unbalanced tree search
    Uts {
        /// Tree parameter file
        input: PathBuf,
    },
    /// Quadratic assignment branch and bound
    Qap {
        /// Problem file
        input: PathBuf,
    },
    /// Floorplan area minimization
    Floorplan {
        /// Cell file
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_suite() {
        let args = CliArgs::parse_from(["inncabs", "sort"]);
        match args.kernel {
            Kernel::Sort {
                size,
                merge_cutoff,
                quick_cutoff,
                insertion_cutoff,
            } => assert_eq!((size, merge_cutoff, quick_cutoff, insertion_cutoff), (10_000, 512, 512, 128)),
            other => panic!("unexpected {:?}", other),
        }

        let args = CliArgs::parse_from(["inncabs", "philosophers", "4"]);
        assert!(matches!(args.kernel, Kernel::Philosophers { n: 4, full_ms: 50 }));
    }

    #[test]
    fn file_kernels_require_input() {
        assert!(CliArgs::try_parse_from(["inncabs", "qap"]).is_err());
        let args = CliArgs::try_parse_from(["inncabs", "--report", "out.json", "uts", "t1.txt"]).unwrap();
        assert_eq!(args.report, Some(PathBuf::from("out.json")));
        assert!(matches!(args.kernel, Kernel::Uts { .. }));
    }
}
