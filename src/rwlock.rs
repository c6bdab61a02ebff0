//! Reader/writer mutual exclusion.

use crate::sys;
use core::fmt;

/// A reader/writer lock over the platform's native shared mutex.
///
/// Any number of threads may hold the lock in shared mode at once, or
/// exactly one thread may hold it in exclusive mode, never both.
///
/// # Debug contract
///
/// A thread may not hold the same `SharedMutex` twice concurrently,
/// regardless of mode: shared-then-exclusive on one instance risks
/// self-deadlock against a pending writer on non-reentrant native
/// implementations, and shared-then-shared has the same hazard. In builds
/// with `debug_assertions`, each thread tracks the set of instances it
/// holds, and a second acquisition of a held instance (or a release of an
/// unheld one) is a fatal panic. The tracking is per-thread state and adds
/// no synchronization of its own.
///
/// # Fairness
///
/// Whatever the native primitive provides; in particular, whether readers
/// or a pending writer win a contended acquisition is unspecified.
pub struct SharedMutex {
    native: sys::RwLock,
}

/// An RAII scoped shared acquisition of a [`SharedMutex`], released when
/// dropped.
#[must_use = "if unused, the lock is immediately released"]
pub struct SharedGuard<'a> {
    lock: &'a SharedMutex,
}

/// An RAII scoped exclusive acquisition of a [`SharedMutex`], released when
/// dropped.
#[must_use = "if unused, the lock is immediately released"]
pub struct ExclusiveGuard<'a> {
    lock: &'a SharedMutex,
}

// === impl SharedMutex ===

impl SharedMutex {
    /// Returns a new `SharedMutex`, in the unlocked state.
    ///
    /// # Examples
    ///
    /// ```
    /// use platform_sync::{SharedGuard, SharedMutex};
    ///
    /// let lock = SharedMutex::new();
    /// let read = SharedGuard::lock(&lock);
    /// drop(read);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        trace!(target: "platform_sync::rwlock", "SharedMutex::new");
        Self {
            native: sys::RwLock::new(),
        }
    }

    /// Acquires the lock in shared mode, blocking the calling thread until
    /// no exclusive holder exists.
    pub fn lock_shared(&self) {
        self.hold();
        self.native.lock_shared();
    }

    /// Acquires the lock in exclusive mode, blocking the calling thread
    /// until no other holder (shared or exclusive) exists.
    pub fn lock_exclusive(&self) {
        self.hold();
        self.native.lock_exclusive();
    }

    /// Attempts to acquire the lock in shared mode without blocking.
    ///
    /// Returns `true` if the lock was acquired; failure leaves the
    /// calling thread's held-state unchanged.
    pub fn try_lock_shared(&self) -> bool {
        self.assert_not_held();
        if !self.native.try_lock_shared() {
            return false;
        }
        self.hold();
        true
    }

    /// Attempts to acquire the lock in exclusive mode without blocking.
    ///
    /// Returns `true` if the lock was acquired; failure leaves the
    /// calling thread's held-state unchanged.
    pub fn try_lock_exclusive(&self) -> bool {
        self.assert_not_held();
        if !self.native.try_lock_exclusive() {
            return false;
        }
        self.hold();
        true
    }

    /// Releases a shared acquisition.
    ///
    /// # Safety
    ///
    /// May only be called by a thread currently holding this lock in shared
    /// mode, paired with one successful shared acquisition. In builds with
    /// `debug_assertions`, releasing an unheld instance panics before the
    /// native release is attempted.
    pub unsafe fn unlock_shared(&self) {
        self.release();
        unsafe { self.native.unlock_shared() }
    }

    /// Releases an exclusive acquisition.
    ///
    /// # Safety
    ///
    /// May only be called by the thread currently holding this lock in
    /// exclusive mode, paired with its successful exclusive acquisition. In
    /// builds with `debug_assertions`, releasing an unheld instance panics
    /// before the native release is attempted.
    pub unsafe fn unlock_exclusive(&self) {
        self.release();
        unsafe { self.native.unlock_exclusive() }
    }

    #[cfg(debug_assertions)]
    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    #[cfg(debug_assertions)]
    #[inline]
    #[track_caller]
    fn hold(&self) {
        assert!(
            crate::held_set::try_hold(self.addr()),
            "thread already holds this SharedMutex; the same instance may \
             not be acquired twice concurrently in any mode"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn hold(&self) {}

    #[cfg(debug_assertions)]
    #[inline]
    #[track_caller]
    fn release(&self) {
        assert!(
            crate::held_set::try_release(self.addr()),
            "thread does not hold this SharedMutex; unlock without a \
             matching lock"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn release(&self) {}

    #[cfg(debug_assertions)]
    #[inline]
    #[track_caller]
    fn assert_not_held(&self) {
        assert!(
            crate::held_set::not_held(self.addr()),
            "thread already holds this SharedMutex; the same instance may \
             not be acquired twice concurrently in any mode"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn assert_not_held(&self) {}
}

impl Default for SharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMutex").finish_non_exhaustive()
    }
}

// === impl SharedGuard ===

impl<'a> SharedGuard<'a> {
    /// Acquires `lock` in shared mode, blocking the calling thread until it
    /// is able to do so, and returns a guard that releases the acquisition
    /// when dropped.
    pub fn lock(lock: &'a SharedMutex) -> Self {
        lock.lock_shared();
        Self { lock }
    }

    /// Attempts to acquire `lock` in shared mode without blocking,
    /// returning a guard on success and [`None`] if the lock was
    /// unavailable.
    pub fn try_lock(lock: &'a SharedMutex) -> Option<Self> {
        if lock.try_lock_shared() {
            Some(Self { lock })
        } else {
            None
        }
    }
}

impl Drop for SharedGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: this guard was constructed from a successful shared
        // acquisition on this thread and is the only release of it.
        unsafe { self.lock.unlock_shared() }
    }
}

impl fmt::Debug for SharedGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedGuard").finish_non_exhaustive()
    }
}

// === impl ExclusiveGuard ===

impl<'a> ExclusiveGuard<'a> {
    /// Acquires `lock` in exclusive mode, blocking the calling thread until
    /// it is able to do so, and returns a guard that releases the
    /// acquisition when dropped.
    pub fn lock(lock: &'a SharedMutex) -> Self {
        lock.lock_exclusive();
        Self { lock }
    }

    /// Attempts to acquire `lock` in exclusive mode without blocking,
    /// returning a guard on success and [`None`] if the lock was
    /// unavailable.
    pub fn try_lock(lock: &'a SharedMutex) -> Option<Self> {
        if lock.try_lock_exclusive() {
            Some(Self { lock })
        } else {
            None
        }
    }
}

impl Drop for ExclusiveGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: this guard was constructed from a successful exclusive
        // acquisition on this thread and is the only release of it.
        unsafe { self.lock.unlock_exclusive() }
    }
}

impl fmt::Debug for ExclusiveGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn probe<R: Send + 'static>(
        lock: &Arc<SharedMutex>,
        f: impl FnOnce(Arc<SharedMutex>) -> R + Send + 'static,
    ) -> R {
        let lock = lock.clone();
        thread::spawn(move || f(lock)).join().unwrap()
    }

    #[test]
    fn concurrent_readers() {
        const READERS: usize = 4;

        let _trace = crate::util::test::trace_init();
        let lock = Arc::new(SharedMutex::new());
        let barrier = Arc::new(Barrier::new(READERS));

        let threads = (0..READERS)
            .map(|i| {
                let lock = lock.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let _guard = SharedGuard::lock(&*lock);
                    tracing::debug!(reader = i, "inside read section");
                    // All readers are inside the read section at once; this
                    // would deadlock if shared holders excluded each other.
                    barrier.wait();
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }
    }

    #[test]
    fn writer_excluded_while_readers_exist() {
        let lock = Arc::new(SharedMutex::new());
        let guard = SharedGuard::lock(&*lock);

        assert!(!probe(&lock, |lock| lock.try_lock_exclusive()));

        drop(guard);
        assert!(probe(&lock, |lock| {
            if lock.try_lock_exclusive() {
                unsafe { lock.unlock_exclusive() }
                true
            } else {
                false
            }
        }));
    }

    #[test]
    fn all_acquisitions_excluded_while_writer_exists() {
        let lock = Arc::new(SharedMutex::new());
        let guard = ExclusiveGuard::lock(&*lock);

        assert!(!probe(&lock, |lock| lock.try_lock_shared()));
        assert!(!probe(&lock, |lock| lock.try_lock_exclusive()));

        drop(guard);
        assert!(probe(&lock, |lock| {
            if lock.try_lock_shared() {
                unsafe { lock.unlock_shared() }
                true
            } else {
                false
            }
        }));
    }

    #[test]
    fn try_lock_failure_leaves_held_state_unchanged() {
        let lock = Arc::new(SharedMutex::new());
        let guard = ExclusiveGuard::lock(&*lock);

        probe(&lock, |lock| {
            // The failed attempts must not poison this thread's held-set:
            // a later acquisition of the same instance still works.
            assert!(!lock.try_lock_shared());
            assert!(!lock.try_lock_exclusive());
        });

        drop(guard);
        probe(&lock, |lock| {
            assert!(lock.try_lock_shared());
            unsafe { lock.unlock_shared() }
        });
    }

    #[test]
    fn distinct_instances_may_nest() {
        let a = SharedMutex::new();
        let b = SharedMutex::new();

        // Holding two distinct instances from one thread is fine; only
        // re-acquiring the *same* instance is a violation.
        let ga = SharedGuard::lock(&a);
        let gb = ExclusiveGuard::lock(&b);
        drop(gb);
        drop(ga);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already holds this SharedMutex")]
    fn shared_then_exclusive_is_fatal() {
        // Leaked so that no native teardown runs on the deliberately
        // still-held lock while the panic unwinds.
        let lock = Box::leak(Box::new(SharedMutex::new()));
        lock.lock_shared();
        // Same thread, same instance, without releasing the first hold.
        lock.lock_exclusive();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "already holds this SharedMutex")]
    fn shared_then_try_shared_is_fatal() {
        let lock = Box::leak(Box::new(SharedMutex::new()));
        lock.lock_shared();
        let _ = lock.try_lock_shared();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not hold this SharedMutex")]
    fn unlock_of_unheld_instance_is_fatal() {
        let lock = SharedMutex::new();
        unsafe { lock.unlock_shared() }
    }
}
