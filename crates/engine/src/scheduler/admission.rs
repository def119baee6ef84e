use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared in-flight counter gating async vs. deferred launches.
///
/// Constructed once (normally at process start) and handed to every
/// [`Scheduler`](super::Scheduler) that should share the budget. The check is
/// a heuristic: concurrent spawns may briefly over- or under-subscribe.
#[derive(Debug)]
pub struct AdmissionCounter {
    in_flight: AtomicUsize,
    limit: usize,
}

impl AdmissionCounter {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            limit,
        })
    }

    /// Reserve an async slot if the counter is below its limit.
    pub fn try_acquire(self: &Arc<Self>) -> Option<AdmissionPermit> {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) < self.limit {
            Some(AdmissionPermit {
                counter: Arc::clone(self),
            })
        } else {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            None
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// An occupied async slot. Released when dropped, i.e. when the work that
/// owns it finishes.
#[derive(Debug)]
pub struct AdmissionPermit {
    counter: Arc<AdmissionCounter>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.counter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_limit() {
        let counter = AdmissionCounter::new(2);
        let a = counter.try_acquire();
        let b = counter.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(counter.try_acquire().is_none());
        assert_eq!(counter.in_flight(), 2);

        drop(a);
        assert_eq!(counter.in_flight(), 1);
        assert!(counter.try_acquire().is_some());
    }

    #[test]
    fn zero_limit_never_admits() {
        let counter = AdmissionCounter::new(0);
        assert!(counter.try_acquire().is_none());
        assert_eq!(counter.in_flight(), 0);
    }
}
