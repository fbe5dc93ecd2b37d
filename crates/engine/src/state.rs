//! Run-wide shared state: the lease cursor and the progress counters.
//!
//! Everything lives behind one mutex. Critical sections are a handful of
//! integer updates and the guard is never held across an `.await`, so a
//! blocking [`std::sync::Mutex`] is the right tool.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A half-open range `[low, high)` of job ids claimed by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lease {
    pub low: i64,
    pub high: i64,
}

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Jobs finished this run, including skips.
    pub completed: u64,
    /// Jobs finished because the remote copy already matched.
    pub skipped: u64,
    pub failed: u64,
    /// Uploads per second over the last sampling interval.
    pub speed: f64,
}

#[derive(Debug)]
struct Inner {
    cursor: i64,
    upper: i64,
    batch: i64,
    counters: Snapshot,
}

/// Cheaply cloneable handle to the state shared by workers and the monitor.
#[derive(Clone, Debug)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
}

impl SharedState {
    /// Leases start at `start` (the lowest pending id) and stop once the
    /// cursor passes `upper` (the highest id in the table).
    pub fn new(start: i64, upper: i64, batch: u32) -> Self {
        let inner = Inner { cursor: start, upper, batch: i64::from(batch.max(1)), counters: Snapshot::default() };
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Counters stay meaningful even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the next range of ids, or `None` once every id has been handed out.
    ///
    /// Ranges are never reissued, even when they turn out to hold no pending rows.
    pub fn next_lease(&self) -> Option<Lease> {
        let mut inner = self.lock();
        if inner.cursor > inner.upper {
            return None;
        }
        let low = inner.cursor;
        let high = low.saturating_add(inner.batch);
        inner.cursor = high;
        Some(Lease { low, high })
    }

    pub fn is_exhausted(&self) -> bool {
        let inner = self.lock();
        inner.cursor > inner.upper
    }

    pub fn record_completed(&self, skipped: bool) {
        let mut inner = self.lock();
        inner.counters.completed += 1;
        if skipped {
            inner.counters.skipped += 1;
        }
    }

    pub fn record_failed(&self) {
        self.lock().counters.failed += 1;
    }

    pub fn completed(&self) -> u64 {
        self.lock().counters.completed
    }

    pub fn set_speed(&self, speed: f64) {
        self.lock().counters.speed = speed;
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_leases_cover_ids_without_overlap() {
        let state = SharedState::new(10, 12, 2);
        assert_eq!(state.next_lease(), Some(Lease { low: 10, high: 12 }));
        assert!(!state.is_exhausted());
        assert_eq!(state.next_lease(), Some(Lease { low: 12, high: 14 }));
        assert!(state.is_exhausted());
        assert_eq!(state.next_lease(), None);
    }

    #[test]
    fn test_single_row() {
        let state = SharedState::new(5, 5, 1000);
        assert_eq!(state.next_lease(), Some(Lease { low: 5, high: 1005 }));
        assert_eq!(state.next_lease(), None);
    }

    #[test]
    fn test_concurrent_leases_are_disjoint() {
        let state = SharedState::new(1, 10_000, 7);
        let leases: Vec<Lease> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let state = state.clone();
                    scope.spawn(move || std::iter::from_fn(|| state.next_lease()).collect::<Vec<_>>())
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        let mut seen = HashSet::new();
        for lease in &leases {
            for id in lease.low..lease.high {
                assert!(seen.insert(id), "id {id} leased twice");
            }
        }
        for id in 1..=10_000 {
            assert!(seen.contains(&id), "id {id} never leased");
        }
    }

    #[test]
    fn test_counters() {
        let state = SharedState::new(1, 1, 1);
        state.record_completed(false);
        state.record_completed(true);
        state.record_failed();
        state.set_speed(2.5);
        let snapshot = state.snapshot();
        assert_eq!(snapshot, Snapshot { completed: 2, skipped: 1, failed: 1, speed: 2.5 });
        assert_eq!(state.completed(), 2);
    }

    #[test]
    fn test_poisoned_lock_still_usable() {
        let state = SharedState::new(1, 1, 1);
        let poisoner = state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison");
        })
        .join();
        state.record_completed(false);
        assert_eq!(state.completed(), 1);
    }
}
