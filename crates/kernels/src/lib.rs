//! Benchmark payloads built on the recursive engine.
//!
//! Every kernel exposes a `run` function taking a scheduler, a policy and
//! its parameters, a checker for the result, and a harness
//! [`Benchmark`](inncabs_bench::Benchmark) implementation.

pub mod fib;
pub mod floorplan;
pub mod intersim;
pub mod nqueens;
pub mod philosophers;
pub mod qap;
pub mod sort;
pub mod sparselu;
pub mod uts;
