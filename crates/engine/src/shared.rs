//! "Best known so far" values shared across concurrently running branches.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::error::{EngineError, EngineResult};

/// A lowest-score-wins scalar updated with a compare-and-swap loop.
#[derive(Debug)]
pub struct BestKnown {
    value: AtomicI64,
}

impl BestKnown {
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Read-only check whether `candidate` would currently improve the value.
    pub fn improves(&self, candidate: i64) -> bool {
        candidate < self.get()
    }

    /// Install `candidate` if it is lower than the current value.
    /// Returns whether this call changed the value.
    pub fn offer(&self, candidate: i64) -> bool {
        let mut current = self.get();
        while candidate < current {
            match self.value.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }
}

/// A lowest-score-wins record carrying a payload (e.g. the best board).
///
/// The score is readable without locking; the payload is replaced under a
/// mutex after re-checking the score.
#[derive(Debug)]
pub struct BestRecord<T> {
    score: AtomicI64,
    payload: Mutex<Option<T>>,
}

impl<T> BestRecord<T> {
    pub fn new(initial_score: i64) -> Self {
        Self {
            score: AtomicI64::new(initial_score),
            payload: Mutex::new(None),
        }
    }

    pub fn score(&self) -> i64 {
        self.score.load(Ordering::Acquire)
    }

    pub fn improves(&self, candidate: i64) -> bool {
        candidate < self.score()
    }

    /// Replace the record if `score` beats it. `make` only runs on success.
    pub fn offer_with(&self, score: i64, make: impl FnOnce() -> T) -> EngineResult<bool> {
        if !self.improves(score) {
            return Ok(false);
        }
        let mut payload = self
            .payload
            .lock()
            .map_err(|e| EngineError::poisoned("best record", e))?;
        // Another writer may have won between the fast check and the lock.
        if !self.improves(score) {
            return Ok(false);
        }
        *payload = Some(make());
        self.score.store(score, Ordering::Release);
        Ok(true)
    }

    pub fn into_inner(self) -> (i64, Option<T>) {
        let score = self.score.into_inner();
        let payload = self
            .payload
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (score, payload)
    }
}

impl<T: Clone> BestRecord<T> {
    pub fn snapshot(&self) -> EngineResult<(i64, Option<T>)> {
        let payload = self
            .payload
            .lock()
            .map_err(|e| EngineError::poisoned("best record", e))?;
        Ok((self.score(), payload.clone()))
    }
}
