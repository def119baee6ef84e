//! Aggregation of sibling handles.
//!
//! Every join waits for all handles it was given, even after a failure, and
//! then reports the first failure in the order the handles were supplied.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::error::EngineResult;
use crate::handle::Handle;

/// Resolve `handles` in order and fold their values into `identity`.
pub fn fold_join<R, A, F>(handles: Vec<Handle<R>>, identity: A, mut combine: F) -> EngineResult<A>
where
    F: FnMut(A, R) -> A,
{
    let mut acc = identity;
    let mut first_err = None;

    for handle in handles {
        match handle.into_result() {
            Ok(value) if first_err.is_none() => acc = combine(acc, value),
            Ok(_) => {}
            Err(e) => {
                if first_err.is_none() {
                    warn!("joined task failed: {}", e);
                    first_err = Some(e);
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(acc),
    }
}

/// Like [`fold_join`], but resolves the handles in a random order.
///
/// Only meaningful for combine functions that are associative and commutative.
pub fn fold_join_shuffled<R, A, F, G>(
    mut handles: Vec<Handle<R>>,
    identity: A,
    combine: F,
    rng: &mut G,
) -> EngineResult<A>
where
    F: FnMut(A, R) -> A,
    G: Rng + ?Sized,
{
    handles.shuffle(rng);
    fold_join(handles, identity, combine)
}

/// Resolve all handles into slots indexed by spawn order.
pub fn collect_join<R>(handles: Vec<Handle<R>>) -> EngineResult<Vec<R>> {
    let capacity = handles.len();
    fold_join(handles, Vec::with_capacity(capacity), |mut slots, value| {
        slots.push(value);
        slots
    })
}

/// Wait for side-effecting children, discarding their values.
pub fn barrier_join<R>(handles: Vec<Handle<R>>) -> EngineResult<()> {
    fold_join(handles, (), |(), _| ())
}
