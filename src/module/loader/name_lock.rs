//! Per-name resolution locks
//!
//! Resolution of one name is serialized; different names proceed in
//! parallel. A name's lock lives only while someone holds a lease on it, so
//! lookups of arbitrary names do not grow the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::utils::{lock_recover, with_lock};

#[derive(Debug, Default)]
pub(crate) struct NameLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    /// Lease the lock for `name`, creating it on first use
    pub(crate) fn lease(&self, name: &str) -> NameLease<'_> {
        let lock = with_lock(&self.locks, |locks| {
            Arc::clone(locks.entry(name.to_string()).or_default())
        });
        NameLease {
            locks: self,
            name: name.to_string(),
            lock,
        }
    }

    pub(crate) fn len(&self) -> usize {
        with_lock(&self.locks, |locks| locks.len())
    }
}

/// Claim on one name's lock; the last lease to go removes the entry
pub(crate) struct NameLease<'a> {
    locks: &'a NameLocks,
    name: String,
    lock: Arc<Mutex<()>>,
}

impl NameLease<'_> {
    /// Block until this name is free
    pub(crate) fn acquire(&self) -> MutexGuard<'_, ()> {
        lock_recover(&self.lock)
    }
}

impl Drop for NameLease<'_> {
    fn drop(&mut self) {
        with_lock(&self.locks.locks, |locks| {
            // Leases are only handed out under the map lock, so a count of two
            // (the map plus this lease) cannot change while we hold it
            let ours = locks
                .get(&self.name)
                .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock));
            if ours && Arc::strong_count(&self.lock) == 2 {
                locks.remove(&self.name);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_lock() {
        let locks = NameLocks::default();
        let a = locks.lease("x.Y");
        let b = locks.lease("x.Y");
        let c = locks.lease("x.Z");
        assert!(Arc::ptr_eq(&a.lock, &b.lock));
        assert!(!Arc::ptr_eq(&a.lock, &c.lock));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_released_names_are_pruned() {
        let locks = NameLocks::default();
        let first = locks.lease("x.Y");
        let second = locks.lease("x.Y");
        drop(first);
        assert_eq!(locks.len(), 1);
        drop(second);
        assert_eq!(locks.len(), 0);

        for i in 0..100 {
            let lease = locks.lease(&format!("missing.Unit{}", i));
            let _guard = lease.acquire();
        }
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_lease_blocks_same_name() {
        let locks = Arc::new(NameLocks::default());
        let lease = locks.lease("x.Y");
        let guard = lease.acquire();

        let other = Arc::clone(&locks);
        let waiter = std::thread::spawn(move || {
            let lease = other.lease("x.Y");
            let _guard = lease.acquire();
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.join().unwrap();
        drop(lease);
        assert_eq!(locks.len(), 0);
    }
}
