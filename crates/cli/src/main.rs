mod cli;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use inncabs_bench::{run_all, Benchmark, ConfigurationReport};
use inncabs_core::config::load_dotenv;
use inncabs_core::{Config, EngineConfig};
use inncabs_engine::Scheduler;
use inncabs_kernels::fib::FibBenchmark;
use inncabs_kernels::floorplan::FloorplanBenchmark;
use inncabs_kernels::intersim::IntersimBenchmark;
use inncabs_kernels::nqueens::NQueensBenchmark;
use inncabs_kernels::philosophers::PhilosophersBenchmark;
use inncabs_kernels::qap::QapBenchmark;
use inncabs_kernels::sort::{SortBenchmark, SortParams};
use inncabs_kernels::sparselu::SparseLuBenchmark;
use inncabs_kernels::uts::UtsBenchmark;
use tracing::info;

use crate::cli::{CliArgs, Kernel};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = Config::from_env();
    if let Some(path) = &args.config {
        let engine = EngineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load engine config {}", path.display()))?
            .with_overrides(|key| config.lookup(key));
        config.engine = engine;
    }
    config.log_summary();

    let scheduler = Scheduler::new(config.engine.clone()).context("failed to start worker pool")?;
    let reports = run_kernel(args.kernel, &config, &scheduler)?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(path, json).with_context(|| format!("failed to write report {}", path.display()))?;
        info!("Wrote report to {}", path.display());
    }

    let metrics = scheduler.metrics();
    info!(
        "Engine: {} spawned, {} demoted, {} abandoned",
        metrics.total_spawned(),
        metrics.demoted,
        metrics.abandoned
    );
    Ok(())
}

fn run_kernel(kernel: Kernel, config: &Config, scheduler: &Scheduler) -> Result<Vec<ConfigurationReport>> {
    match kernel {
        Kernel::Fib { n } => bench(FibBenchmark { n }, config, scheduler),
        Kernel::Nqueens { n, threshold } => bench(NQueensBenchmark { n, threshold }, config, scheduler),
        Kernel::Sort {
            size,
            merge_cutoff,
            quick_cutoff,
            insertion_cutoff,
        } => {
            let params = SortParams {
                size,
                merge_cutoff,
                quick_cutoff,
                insertion_cutoff,
            };
            bench(SortBenchmark::new(params), config, scheduler)
        }
        Kernel::Intersim { n } => bench(IntersimBenchmark::new(n), config, scheduler),
        Kernel::Philosophers { n, full_ms } => {
            let full = Duration::from_millis(full_ms);
            bench(PhilosophersBenchmark { n, full }, config, scheduler)
        }
        Kernel::Sparselu { blocks, block_size } => {
            bench(SparseLuBenchmark::new(blocks, block_size), config, scheduler)
        }
        Kernel::Uts { input } => {
            let b = UtsBenchmark::from_file(&input)
                .with_context(|| format!("failed to read UTS input {}", input.display()))?;
            bench(b, config, scheduler)
        }
        Kernel::Qap { input } => {
            let b = QapBenchmark::from_file(&input)
                .with_context(|| format!("failed to read QAP input {}", input.display()))?;
            bench(b, config, scheduler)
        }
        Kernel::Floorplan { input } => {
            let b = FloorplanBenchmark::from_file(&input)
                .with_context(|| format!("failed to read floorplan input {}", input.display()))?;
            bench(b, config, scheduler)
        }
    }
}

fn bench<B: Benchmark>(mut b: B, config: &Config, scheduler: &Scheduler) -> Result<Vec<ConfigurationReport>> {
    let stdout = io::stdout();
    let reports = run_all(&mut b, &config.harness, scheduler, &mut stdout.lock())
        .context("failed to write results")?;
    Ok(reports)
}
