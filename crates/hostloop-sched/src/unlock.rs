//! Scoped unlock of the executor mutex.
//!
//! The worker releases the queue lock while it runs popped tasks so that
//! `schedule_delayed` callers are never blocked by a long action, and takes
//! it back on every exit path, unwinding included.

use parking_lot::MutexGuard;

/// Run `f` with the lock behind `guard` released, re-locking afterwards
pub fn unlocked<T, F, R>(guard: &mut MutexGuard<'_, T>, f: F) -> R
where
    F: FnOnce() -> R,
{
    MutexGuard::unlocked(guard, f)
}
