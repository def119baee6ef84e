//! Recursive task-spawning engine: decide, spawn, join.
//!
//! A [`RecursiveTask`] describes a divide-and-conquer kernel through a
//! base-case predicate, a base-case function and a decomposition step. The
//! [`Driver`] evaluates it over [`TaskDescriptor`]s, launching every child
//! through the [`Scheduler`] under one [`Policy`] and resolving results via
//! [`Handle`]s that are combined with the joins in [`join`].

pub mod descriptor;
pub mod driver;
pub mod error;
pub mod handle;
pub mod join;
pub mod policy;
pub mod scheduler;
pub mod shared;
pub mod sync;

pub use descriptor::TaskDescriptor;
pub use driver::{Driver, RecursiveTask, Step, StepState};
pub use error::{EngineError, EngineResult};
pub use handle::Handle;
pub use join::{barrier_join, collect_join, fold_join, fold_join_shuffled};
pub use policy::Policy;
pub use scheduler::{AdmissionCounter, AdmissionPermit, EngineMetrics, MetricsSnapshot, Scheduler};
pub use shared::{BestKnown, BestRecord};
pub use sync::{lock_ordered, retry_validated, Attempt, OrderedLocks};
