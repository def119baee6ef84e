//! Launches units of work under a [`Policy`](crate::Policy).
//!
//! The scheduler owns a worker pool for async work, an injected admission
//! counter that gates the adaptive policy, and process-wide metrics. Work is
//! wrapped in a [`Handle`](crate::Handle); whoever observes a handle first
//! runs still-queued work inline, so a blocked observer never waits on work
//! that no thread is executing.

pub mod admission;
pub mod metrics;
pub mod runner;

pub use admission::{AdmissionCounter, AdmissionPermit};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use runner::Scheduler;
