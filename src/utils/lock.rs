//! Lock utilities
//!
//! Helpers for common lock patterns with automatic release. A poisoned lock
//! is recovered rather than propagated: the guarded maps and flags stay
//! consistent across a panicking holder, so the data is still usable.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tracing::warn;

/// Acquire a Mutex, recovering it if a previous holder panicked
pub fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering poisoned mutex");
        PoisonError::into_inner(poisoned)
    })
}

/// Execute a closure with a Mutex lock, automatically releasing it
///
/// # Example
/// ```rust
/// use std::sync::Mutex;
/// use bundle_loader::utils::with_lock;
///
/// let counter = Mutex::new(0);
/// let value = with_lock(&counter, |c| {
///     *c += 1;
///     *c
/// });
/// assert_eq!(value, 1);
/// ```
pub fn with_lock<T, F, R>(mutex: &Mutex<T>, f: F) -> R
where
    F: FnOnce(&mut T) -> R,
{
    let mut guard = lock_recover(mutex);
    f(&mut guard)
}

/// Execute a closure with a read lock, automatically releasing it
pub fn with_read_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&T) -> R,
{
    let guard = rwlock.read().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

/// Execute a closure with a write lock, automatically releasing it
pub fn with_write_lock<T, F, R>(rwlock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&mut T) -> R,
{
    let mut guard = rwlock.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}
