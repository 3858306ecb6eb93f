//! Single-flight coordination.
//!
//! At most one computation per key is in flight. The first caller for a key
//! becomes the leader and receives a [`FlightGuard`]; later callers block in
//! [`FlightTable::join`] until the guard is dropped, then re-check the cache.
//! The guard is released on success, on error and during a panic unwind, so
//! a failed leader never strands its waiters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::keys::CacheKey;

struct Flight {
    done: Mutex<bool>,
    finished: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            finished: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.finished.wait(&mut done);
        }
    }

    fn finish(&self) {
        *self.done.lock() = true;
        self.finished.notify_all();
    }
}

/// Outcome of joining a flight.
pub enum Join<'a> {
    /// No computation was in flight; the caller must compute and then drop
    /// the guard.
    Leader(FlightGuard<'a>),
    /// Another caller's computation for the key has finished.
    Waited,
}

/// In-flight computations, by key.
#[derive(Default)]
pub struct FlightTable {
    inflight: Mutex<HashMap<CacheKey, Arc<Flight>>>,
}

impl FlightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, or wait for the current leader.
    pub fn join(&self, key: &CacheKey) -> Join<'_> {
        let existing = {
            let mut inflight = self.inflight.lock();
            match inflight.get(key) {
                Some(flight) => Some(Arc::clone(flight)),
                None => {
                    inflight.insert(key.clone(), Arc::new(Flight::new()));
                    None
                }
            }
        };

        match existing {
            None => Join::Leader(FlightGuard {
                table: self,
                key: key.clone(),
            }),
            Some(flight) => {
                flight.wait();
                Join::Waited
            }
        }
    }

    /// Number of keys currently being computed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Leadership of one key's computation. Dropping it wakes the waiters.
pub struct FlightGuard<'a> {
    table: &'a FlightTable,
    key: CacheKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let flight = self.table.inflight.lock().remove(&self.key);
        if let Some(flight) = flight {
            flight.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::encode;
    use memora_core::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn key(n: i32) -> CacheKey {
        CacheKey::Canonical(encode(&Value::from(n)))
    }

    #[test]
    fn test_first_caller_leads() {
        let table = FlightTable::new();
        let join = table.join(&key(1));
        assert!(matches!(join, Join::Leader(_)));
        assert_eq!(table.in_flight(), 1);

        drop(join);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let table = FlightTable::new();
        let a = table.join(&key(1));
        let b = table.join(&key(2));
        assert!(matches!(a, Join::Leader(_)));
        assert!(matches!(b, Join::Leader(_)));
        assert_eq!(table.in_flight(), 2);
    }

    #[test]
    fn test_waiters_block_until_leader_finishes() {
        let table = FlightTable::new();
        let finished = AtomicUsize::new(0);

        thread::scope(|s| {
            let guard = table.join(&key(1));
            assert!(matches!(guard, Join::Leader(_)));

            let waiters: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        // A late thread may arrive after the leader is done
                        // and lead itself; either way it ran after `finished`.
                        let _join = table.join(&key(1));
                        finished.load(Ordering::SeqCst)
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(50));
            finished.store(1, Ordering::SeqCst);
            drop(guard);

            for waiter in waiters {
                assert_eq!(waiter.join().unwrap(), 1);
            }
        });

        assert_eq!(table.in_flight(), 0);
    }
}
