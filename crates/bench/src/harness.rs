use std::io::{self, Write};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use inncabs_core::{HarnessConfig, OutputFormat};
use inncabs_engine::{Policy, Scheduler};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::benchmark::Benchmark;
use crate::stats::{format_float, median, stddev};
use crate::timeout::TimeoutGuard;

/// Result of all trials of one benchmark under one policy.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationReport {
    pub benchmark: String,
    pub policy: Policy,
    /// True only if every trial executed and passed its check.
    pub success: bool,
    pub median_ms: u64,
    pub stddev_ms: f64,
    pub times_ms: Vec<u64>,
    pub started_at: DateTime<Utc>,
}

/// Resolve launch type names into policies, in reporting order.
///
/// Unknown names are skipped with a warning; duplicates collapse.
pub fn selected_policies(launch_types: &[String]) -> Vec<Policy> {
    let mut requested = Vec::new();
    for name in launch_types {
        match name.parse::<Policy>() {
            Ok(policy) => requested.push(policy),
            Err(e) => warn!("Ignoring launch type: {}", e),
        }
    }
    Policy::ALL
        .into_iter()
        .filter(|p| requested.contains(p))
        .collect()
}

/// Time `bench` under every selected policy and write the report to `out`.
///
/// Each trial runs the initializer, the timed execution and the checker. An
/// execution error counts as a failed check. If a timeout is configured the
/// whole process is terminated once it expires.
pub fn run_all<B, W>(
    bench: &mut B,
    config: &HarnessConfig,
    scheduler: &Scheduler,
    out: &mut W,
) -> io::Result<Vec<ConfigurationReport>>
where
    B: Benchmark,
    W: Write,
{
    let _guard = config.timeout.map(TimeoutGuard::arm);
    let name = bench.name();
    let policies = selected_policies(&config.launch_types);
    info!(
        "Running {} with {} launch type(s), {} repeat(s)",
        name,
        policies.len(),
        config.repeats
    );

    match config.output {
        OutputFormat::Csv => writeln!(out, "{:>16}, success, time (ms), stddev", name)?,
        OutputFormat::Verbose => writeln!(out, "Benchmarking {}", name)?,
        OutputFormat::Minimal => {}
    }

    let mut reports = Vec::with_capacity(policies.len());
    for policy in policies {
        let report = run_configuration(bench, &name, policy, config.repeats, scheduler);
        write_report(out, config.output, &report)?;
        reports.push(report);
    }
    out.flush()?;
    Ok(reports)
}

fn run_configuration<B: Benchmark>(
    bench: &mut B,
    name: &str,
    policy: Policy,
    repeats: u32,
    scheduler: &Scheduler,
) -> ConfigurationReport {
    let started_at = Utc::now();
    let metrics = scheduler.metrics_handle();
    let mut times_ms = Vec::with_capacity(repeats as usize);
    let mut success = true;

    for trial in 0..repeats {
        bench.initialize();
        let start = Instant::now();
        let result = bench.execute(scheduler, policy);
        let elapsed = start.elapsed();

        let passed = match result {
            Ok(output) => bench.check(&output),
            Err(e) => {
                warn!("{} [{}] trial {} failed: {}", name, policy, trial, e);
                false
            }
        };
        if !passed {
            warn!("{} [{}] trial {} did not verify", name, policy, trial);
        }
        debug!("{} [{}] trial {} took {:?}", name, policy, trial, elapsed);

        success &= passed;
        times_ms.push(as_millis(elapsed));
        metrics.record_run(name, policy, elapsed);
    }

    ConfigurationReport {
        benchmark: name.to_string(),
        policy,
        success,
        median_ms: median(&times_ms),
        stddev_ms: stddev(&times_ms),
        times_ms,
        started_at,
    }
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn write_report<W: Write>(out: &mut W, format: OutputFormat, r: &ConfigurationReport) -> io::Result<()> {
    let stddev = format_float(r.stddev_ms);
    match format {
        OutputFormat::Minimal => writeln!(out, "{},{}", r.median_ms, stddev),
        OutputFormat::Csv => writeln!(
            out,
            "{:>16}, {:>14}, {:>14}, {:>14}",
            r.policy.name(),
            u8::from(r.success),
            r.median_ms,
            stddev
        ),
        OutputFormat::Verbose => {
            writeln!(out, "launch: {}", r.policy)?;
            writeln!(out, "success: {}", if r.success { "SUCCESSFUL" } else { "FAILED" })?;
            writeln!(out, "time: {} ms", r.median_ms)?;
            writeln!(out, "stddev: {}", stddev)
        }
    }
}

#[cfg(test)]
mod tests {
    use inncabs_core::EngineConfig;
    use inncabs_engine::{EngineError, EngineResult};

    use super::*;

    /// Sums 1..=n; fails verification under the deferred policy.
    struct Triangle {
        n: u64,
        initialized: u32,
    }

    impl Benchmark for Triangle {
        type Output = (Policy, u64);

        fn name(&self) -> String {
            format!("Triangle N={}", self.n)
        }

        fn initialize(&mut self) {
            self.initialized += 1;
        }

        fn execute(&mut self, scheduler: &Scheduler, policy: Policy) -> EngineResult<(Policy, u64)> {
            let n = self.n;
            let sum = scheduler.spawn(policy, move || Ok((1..=n).sum::<u64>())).into_result()?;
            Ok((policy, sum))
        }

        fn check(&self, &(policy, sum): &(Policy, u64)) -> bool {
            policy != Policy::Deferred && sum == self.n * (self.n + 1) / 2
        }
    }

    struct Broken;

    impl Benchmark for Broken {
        type Output = ();

        fn name(&self) -> String {
            "Broken".to_string()
        }

        fn execute(&mut self, _: &Scheduler, _: Policy) -> EngineResult<()> {
            Err(EngineError::failed("no input"))
        }

        fn check(&self, _: &()) -> bool {
            true
        }
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(EngineConfig {
            worker_threads: 2,
            admission_limit: 2,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    fn config(output: OutputFormat, repeats: u32, launch: &[&str]) -> HarnessConfig {
        HarnessConfig {
            output,
            repeats,
            launch_types: launch.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }

    #[test]
    fn policies_follow_reporting_order() {
        let names: Vec<String> = ["async", "bogus", "deferred", "optional", "async"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            selected_policies(&names),
            vec![Policy::Deferred, Policy::AsyncOrDeferred, Policy::Async]
        );
    }

    #[test]
    fn verbose_report() {
        let mut bench = Triangle { n: 100, initialized: 0 };
        let mut out = Vec::new();
        let reports = run_all(
            &mut bench,
            &config(OutputFormat::Verbose, 3, &["deferred", "async"]),
            &scheduler(),
            &mut out,
        )
        .unwrap();

        assert_eq!(bench.initialized, 6);
        assert_eq!(reports.len(), 2);
        assert!(!reports[0].success);
        assert!(reports[1].success);
        assert_eq!(reports[1].times_ms.len(), 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Benchmarking Triangle N=100");
        assert_eq!(lines[1], "launch: deferred");
        assert_eq!(lines[2], "success: FAILED");
        assert!(lines[3].starts_with("time: ") && lines[3].ends_with(" ms"));
        assert!(lines[4].starts_with("stddev: "));
        assert_eq!(lines[5], "launch: async");
        assert_eq!(lines[6], "success: SUCCESSFUL");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn csv_report() {
        let mut bench = Triangle { n: 10, initialized: 0 };
        let mut out = Vec::new();
        run_all(
            &mut bench,
            &config(OutputFormat::Csv, 1, &["immediate"]),
            &scheduler(),
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "   Triangle N=10, success, time (ms), stddev");
        let cols: Vec<&str> = lines[1].split(',').map(str::trim).collect();
        assert_eq!(cols[0], "immediate");
        assert_eq!(cols[1], "1");
        assert_eq!(cols[3], "0");
    }

    #[test]
    fn minimal_report_has_no_header() {
        let mut bench = Triangle { n: 10, initialized: 0 };
        let mut out = Vec::new();
        run_all(
            &mut bench,
            &config(OutputFormat::Minimal, 2, &["async", "optional"]),
            &scheduler(),
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            let (median, stddev) = line.split_once(',').unwrap();
            assert!(median.parse::<u64>().is_ok());
            assert!(stddev.parse::<f64>().is_ok());
        }
    }

    #[test]
    fn execution_error_is_a_failed_check() {
        let mut out = Vec::new();
        let s = scheduler();
        let reports = run_all(
            &mut Broken,
            &config(OutputFormat::Verbose, 2, &["async"]),
            &s,
            &mut out,
        )
        .unwrap();
        assert!(!reports[0].success);
        assert!(String::from_utf8(out).unwrap().contains("success: FAILED"));
        assert_eq!(s.metrics().runs["Broken"].count, 2);
    }

    #[test]
    fn report_serializes() {
        let mut bench = Triangle { n: 3, initialized: 0 };
        let reports = run_all(
            &mut bench,
            &config(OutputFormat::Minimal, 1, &["async"]),
            &scheduler(),
            &mut io::sink(),
        )
        .unwrap();
        let json = serde_json::to_value(&reports[0]).unwrap();
        assert_eq!(json["policy"], "async");
        assert_eq!(json["success"], true);
    }
}
