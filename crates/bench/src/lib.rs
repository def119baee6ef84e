//! Timing and verification harness shared by every kernel.
//!
//! A [`Benchmark`] is run once per selected launch policy, `repeats` times
//! each, and the median and standard deviation of the wall-clock times are
//! written in the configured [`OutputFormat`](inncabs_core::OutputFormat).

pub mod benchmark;
pub mod harness;
pub mod stats;
pub mod timeout;

pub use benchmark::Benchmark;
pub use harness::{run_all, selected_policies, ConfigurationReport};
pub use timeout::TimeoutGuard;
