//! Non-reentrant mutual exclusion.

use crate::sys;
#[cfg(debug_assertions)]
use core::cell::Cell;
use core::fmt;

/// A non-reentrant mutual exclusion lock over the platform's native mutex.
///
/// At most one thread holds the lock at a time. The thread that acquired it
/// must be the one to release it, and must release it exactly once; in
/// builds with `debug_assertions`, an unbalanced [`unlock`] is a fatal
/// panic, and dropping the mutex while held aborts the process (the native
/// handle cannot be torn down while locked, so the violation cannot unwind
/// past the destructor). The lock is *not* reentrant: a thread
/// that already holds it and calls [`lock`] again deadlocks on the native
/// primitive before any debug check can run (use [`RecursiveMutex`] when
/// re-entry is needed). The debug counter therefore catches unbalanced
/// bookkeeping across call sites, not live reentrant deadlocks.
///
/// # Fairness
///
/// Whatever the native primitive provides; no ordering of waiters is
/// guaranteed beyond that.
///
/// [`lock`]: Mutex::lock
/// [`unlock`]: Mutex::unlock
/// [`RecursiveMutex`]: crate::RecursiveMutex
pub struct Mutex {
    native: sys::Mutex,
    // 0 when unheld, 1 between a lock and its matching unlock. Only touched
    // while `native` is held, so plain cell storage is race-free.
    #[cfg(debug_assertions)]
    level: Cell<usize>,
}

/// Safety: the debug `level` cell is only accessed by the thread currently
/// holding `native`, which serializes all access to it.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

/// Trait abstracting over this crate's blocking mutual exclusion locks.
///
/// Implemented by [`Mutex`], [`RecursiveMutex`](crate::RecursiveMutex), and
/// [`SpinningMutex`](crate::SpinningMutex); consumed by [`MutexGuard`] so a
/// scoped acquisition works with any of them.
///
/// # Safety
///
/// Implementations must ensure that the lock is actually exclusive: `lock`
/// must not return while another thread holds the lock.
pub unsafe trait RawMutex {
    /// Acquires the lock, blocking the calling thread until it is able to
    /// do so.
    fn lock(&self);

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// May only be called by a thread currently holding the lock, paired
    /// with exactly one successful acquisition.
    unsafe fn unlock(&self);
}

/// A [`RawMutex`] that can additionally be acquired without blocking.
///
/// Implemented by [`Mutex`] and [`RecursiveMutex`](crate::RecursiveMutex).
/// [`SpinningMutex`](crate::SpinningMutex) does not implement this trait;
/// the spinning lock only blocks.
///
/// # Safety
///
/// As for [`RawMutex`]: `try_lock` may return `true` only if the lock was
/// actually acquired by the calling thread.
pub unsafe trait RawTryMutex: RawMutex {
    /// Attempts to acquire the lock without blocking, returning `true` if
    /// it was acquired.
    fn try_lock(&self) -> bool;
}

/// An RAII scoped acquisition of a [`RawMutex`]. The lock is acquired when
/// the guard is constructed and released when it is dropped.
#[must_use = "if unused, the lock is immediately released"]
pub struct MutexGuard<'a, L: RawMutex = Mutex> {
    lock: &'a L,
}

// === impl Mutex ===

impl Mutex {
    /// Returns a new `Mutex`, in the unlocked state.
    ///
    /// # Examples
    ///
    /// ```
    /// use platform_sync::{Mutex, MutexGuard};
    ///
    /// let mutex = Mutex::new();
    /// let guard = MutexGuard::lock(&mutex);
    /// drop(guard);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        trace!(target: "platform_sync::mutex", "Mutex::new");
        Self {
            native: sys::Mutex::new(),
            #[cfg(debug_assertions)]
            level: Cell::new(0),
        }
    }

    /// Acquires the lock, blocking the calling thread until it exclusively
    /// owns it.
    pub fn lock(&self) {
        self.native.lock();
        self.assert_unheld_and_mark();
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `true` if the lock was acquired. Returning `false` is an
    /// expected outcome, not an error.
    pub fn try_lock(&self) -> bool {
        if !self.native.try_lock() {
            return false;
        }
        self.assert_unheld_and_mark();
        true
    }

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// May only be called by the thread currently holding the lock, paired
    /// with exactly one successful [`lock`] or [`try_lock`]. In builds with
    /// `debug_assertions`, an unbalanced call panics before the native
    /// release is attempted.
    ///
    /// [`lock`]: Mutex::lock
    /// [`try_lock`]: Mutex::try_lock
    pub unsafe fn unlock(&self) {
        self.assert_held_and_unmark();
        unsafe { self.native.unlock() }
    }

    #[cfg(debug_assertions)]
    #[inline]
    #[track_caller]
    fn assert_unheld_and_mark(&self) {
        assert_eq!(
            self.level.get(),
            0,
            "mutex was already marked as held; lock/unlock calls are unbalanced"
        );
        self.level.set(1);
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn assert_unheld_and_mark(&self) {}

    #[cfg(debug_assertions)]
    #[inline]
    #[track_caller]
    fn assert_held_and_unmark(&self) {
        assert_eq!(
            self.level.get(),
            1,
            "mutex is not held; unlock without a matching lock"
        );
        self.level.set(0);
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn assert_held_and_unmark(&self) {}
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        assert_eq!(self.level.get(), 0, "mutex dropped while held");
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Mutex");
        #[cfg(debug_assertions)]
        s.field("level", &self.level.get());
        s.finish_non_exhaustive()
    }
}

unsafe impl RawMutex for Mutex {
    #[inline]
    fn lock(&self) {
        Mutex::lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        unsafe { Mutex::unlock(self) }
    }
}

unsafe impl RawTryMutex for Mutex {
    #[inline]
    fn try_lock(&self) -> bool {
        Mutex::try_lock(self)
    }
}

// === impl MutexGuard ===

impl<'a, L: RawMutex> MutexGuard<'a, L> {
    /// Acquires `lock`, blocking the calling thread until it is able to do
    /// so, and returns a guard that releases the lock when dropped.
    pub fn lock(lock: &'a L) -> Self {
        lock.lock();
        Self { lock }
    }
}

impl<'a, L: RawTryMutex> MutexGuard<'a, L> {
    /// Attempts to acquire `lock` without blocking, returning a guard on
    /// success and [`None`] if the lock was unavailable.
    pub fn try_lock(lock: &'a L) -> Option<Self> {
        if lock.try_lock() {
            Some(Self { lock })
        } else {
            None
        }
    }
}

impl<L: RawMutex> Drop for MutexGuard<'_, L> {
    #[inline]
    fn drop(&mut self) {
        // Safety: this guard was constructed from a successful acquisition
        // on this thread and is the only release of it.
        unsafe { self.lock.unlock() }
    }
}

impl<L: RawMutex> fmt::Debug for MutexGuard<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn balanced_lock_unlock_cycles() {
        let mutex = Mutex::new();
        for _ in 0..32 {
            mutex.lock();
            unsafe { mutex.unlock() }
        }
        for _ in 0..32 {
            let guard = MutexGuard::lock(&mutex);
            drop(guard);
        }
        // Unheld afterwards: another acquisition succeeds immediately.
        assert!(mutex.try_lock());
        unsafe { mutex.unlock() }
    }

    #[test]
    fn try_lock_does_not_block() {
        let mutex = Arc::new(Mutex::new());
        let guard = MutexGuard::lock(&*mutex);

        // The holder's own try_lock fails rather than deadlocking...
        assert!(!mutex.try_lock());

        // ...and so does another thread's, without suspending it.
        let contender = mutex.clone();
        let acquired = thread::spawn(move || contender.try_lock())
            .join()
            .unwrap();
        assert!(!acquired);

        drop(guard);

        let contender = mutex.clone();
        let acquired = thread::spawn(move || {
            if contender.try_lock() {
                unsafe { contender.unlock() }
                true
            } else {
                false
            }
        })
        .join()
        .unwrap();
        assert!(acquired);
    }

    #[test]
    fn guard_try_lock() {
        let mutex = Mutex::new();
        let held = MutexGuard::lock(&mutex);
        assert!(MutexGuard::try_lock(&mutex).is_none());
        drop(held);

        let guard = MutexGuard::try_lock(&mutex);
        assert!(guard.is_some());
    }

    #[test]
    fn multithreaded_counter() {
        const THREADS: usize = 4;
        const CYCLES: usize = 1000;

        let _trace = crate::util::test::trace_init();
        let mutex = Arc::new(Mutex::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let threads = (0..THREADS)
            .map(|_| {
                let mutex = mutex.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..CYCLES {
                        let _guard = MutexGuard::lock(&*mutex);
                        // Non-atomic read-modify-write; lost updates would
                        // show up in the final count.
                        let value = counter.load(Relaxed);
                        counter.store(value + 1, Relaxed);
                    }
                })
            })
            .collect::<Vec<_>>();

        for thread in threads {
            thread.join().unwrap();
        }
        tracing::info!(count = counter.load(Relaxed), "all threads done");
        assert_eq!(counter.load(Relaxed), THREADS * CYCLES);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn drop_while_held_is_fatal() {
        // The violating drop takes the whole process down rather than
        // unwinding (the native handle cannot be destroyed while locked),
        // so it runs in a child process.
        if std::env::var_os("PLATFORM_SYNC_TEST_DROP_HELD").is_some() {
            let mutex = Mutex::new();
            mutex.lock();
            drop(mutex);
            return;
        }

        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .arg("--exact")
            .arg("mutex::tests::drop_while_held_is_fatal")
            .env("PLATFORM_SYNC_TEST_DROP_HELD", "1")
            .status()
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unlock without a matching lock")]
    fn unbalanced_unlock_is_fatal() {
        let mutex = Mutex::new();
        // The bookkeeping assertion fires before the native release is
        // attempted, so this never reaches the OS primitive.
        unsafe { mutex.unlock() }
    }
}
