//! Multi-lock helpers for kernels that mutate shared structures in place.

use std::sync::{Mutex, MutexGuard};
use std::thread;

use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Guards acquired by [`lock_ordered`], held until dropped.
pub struct OrderedLocks<'a, K, V> {
    guards: Vec<(K, MutexGuard<'a, V>)>,
}

impl<'a, K: Ord, V> OrderedLocks<'a, K, V> {
    fn position(&self, key: &K) -> Option<usize> {
        self.guards.binary_search_by(|(k, _)| k.cmp(key)).ok()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.position(key).map(|i| &*self.guards[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.position(key).map(move |i| &mut *self.guards[i].1)
    }

    /// Locked keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.guards.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Lock every mutex in ascending key order.
///
/// Duplicate keys are locked once. Any two callers that go through this
/// function acquire overlapping locks in the same global order.
pub fn lock_ordered<'a, K: Ord, V>(
    mut locks: Vec<(K, &'a Mutex<V>)>,
) -> EngineResult<OrderedLocks<'a, K, V>> {
    locks.sort_by(|a, b| a.0.cmp(&b.0));
    locks.dedup_by(|a, b| a.0 == b.0);

    let mut guards = Vec::with_capacity(locks.len());
    for (key, mutex) in locks {
        let guard = mutex
            .lock()
            .map_err(|e| EngineError::poisoned("ordered lock", e))?;
        guards.push((key, guard));
    }
    Ok(OrderedLocks { guards })
}

/// Outcome of one optimistic attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Commit(T),
    /// State changed between the unlocked read and the locked validation.
    Retry,
}

/// Run `attempt` until it commits or fails.
///
/// Each attempt reads without locks, locks what it needs, validates that its
/// read is still current and then commits or asks to retry.
pub fn retry_validated<T, F>(mut attempt: F) -> EngineResult<T>
where
    F: FnMut() -> EngineResult<Attempt<T>>,
{
    let mut retries = 0u64;
    loop {
        match attempt()? {
            Attempt::Commit(value) => {
                if retries > 0 {
                    trace!(retries, "validated update committed after retry");
                }
                return Ok(value);
            }
            Attempt::Retry => {
                retries += 1;
                thread::yield_now();
            }
        }
    }
}
