//! Reentrant mutual exclusion.

use crate::mutex::{RawMutex, RawTryMutex};
use crate::sys;
#[cfg(debug_assertions)]
use core::cell::Cell;
use core::fmt;

/// A reentrant mutual exclusion lock over the platform's native recursive
/// mutex.
///
/// The thread that holds the lock may acquire it again any number of times;
/// it becomes available to other threads once the owner has released it as
/// many times as it was acquired. While one thread owns the lock, another
/// thread's [`lock`] blocks and its [`try_lock`] fails immediately.
///
/// In builds with `debug_assertions`, the acquisition depth is tracked:
/// releasing more times than the lock was acquired is a fatal panic, and
/// dropping the mutex with a non-zero depth aborts the process (the native
/// handle cannot be torn down while locked, so the violation cannot unwind
/// past the destructor).
///
/// [`lock`]: RecursiveMutex::lock
/// [`try_lock`]: RecursiveMutex::try_lock
pub struct RecursiveMutex {
    native: sys::RecursiveMutex,
    // Acquisition depth. Only the owning thread's own calls move it, while
    // it holds `native`, so plain cell storage is race-free.
    #[cfg(debug_assertions)]
    level: Cell<usize>,
}

/// Safety: the debug `level` cell is only accessed by the thread currently
/// holding `native`, which serializes all access to it.
unsafe impl Send for RecursiveMutex {}
unsafe impl Sync for RecursiveMutex {}

// === impl RecursiveMutex ===

impl RecursiveMutex {
    /// Returns a new `RecursiveMutex`, in the unlocked state.
    #[must_use]
    pub fn new() -> Self {
        trace!(target: "platform_sync::recursive", "RecursiveMutex::new");
        Self {
            native: sys::RecursiveMutex::new(),
            #[cfg(debug_assertions)]
            level: Cell::new(0),
        }
    }

    /// Acquires the lock, blocking the calling thread until it is able to
    /// do so. A thread already holding the lock acquires it again without
    /// blocking.
    pub fn lock(&self) {
        self.native.lock();
        self.mark_acquired();
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Succeeds if the lock is free or already owned by the calling thread;
    /// fails immediately if another thread owns it.
    pub fn try_lock(&self) -> bool {
        if !self.native.try_lock() {
            return false;
        }
        self.mark_acquired();
        true
    }

    /// Releases the lock once; the lock only becomes available to other
    /// threads after as many releases as acquisitions.
    ///
    /// # Safety
    ///
    /// May only be called by the thread currently owning the lock, paired
    /// with one successful [`lock`] or [`try_lock`]. In builds with
    /// `debug_assertions`, a depth underflow panics before the native
    /// release is attempted.
    ///
    /// [`lock`]: RecursiveMutex::lock
    /// [`try_lock`]: RecursiveMutex::try_lock
    pub unsafe fn unlock(&self) {
        self.mark_released();
        unsafe { self.native.unlock() }
    }

    #[cfg(debug_assertions)]
    #[inline]
    fn mark_acquired(&self) {
        self.level.set(self.level.get() + 1);
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn mark_acquired(&self) {}

    #[cfg(debug_assertions)]
    #[inline]
    #[track_caller]
    fn mark_released(&self) {
        let level = self.level.get();
        assert!(
            level > 0,
            "recursive mutex unlocked more times than it was locked"
        );
        self.level.set(level - 1);
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn mark_released(&self) {}
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecursiveMutex {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        assert_eq!(
            self.level.get(),
            0,
            "recursive mutex dropped while held"
        );
    }
}

impl fmt::Debug for RecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RecursiveMutex");
        #[cfg(debug_assertions)]
        s.field("level", &self.level.get());
        s.finish_non_exhaustive()
    }
}

unsafe impl RawMutex for RecursiveMutex {
    #[inline]
    fn lock(&self) {
        RecursiveMutex::lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        unsafe { RecursiveMutex::unlock(self) }
    }
}

unsafe impl RawTryMutex for RecursiveMutex {
    #[inline]
    fn try_lock(&self) -> bool {
        RecursiveMutex::try_lock(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::MutexGuard;
    use std::sync::Arc;
    use std::thread;

    fn probe_try_lock(mutex: &Arc<RecursiveMutex>) -> bool {
        let mutex = mutex.clone();
        thread::spawn(move || {
            if mutex.try_lock() {
                unsafe { mutex.unlock() }
                true
            } else {
                false
            }
        })
        .join()
        .unwrap()
    }

    #[test]
    fn reentrant_depth_counts_down() {
        const DEPTH: usize = 5;

        let mutex = Arc::new(RecursiveMutex::new());
        for _ in 0..DEPTH {
            mutex.lock();
        }

        // Unavailable to other threads until the owner fully releases.
        for _ in 0..DEPTH - 1 {
            assert!(!probe_try_lock(&mutex));
            unsafe { mutex.unlock() }
        }
        assert!(!probe_try_lock(&mutex));
        unsafe { mutex.unlock() }

        assert!(probe_try_lock(&mutex));
    }

    #[test]
    fn try_lock_reenters_for_owner() {
        let mutex = RecursiveMutex::new();
        mutex.lock();
        assert!(mutex.try_lock());
        unsafe {
            mutex.unlock();
            mutex.unlock();
        }
    }

    #[test]
    fn guard_acquisitions_nest() {
        let mutex = RecursiveMutex::new();
        let outer = MutexGuard::lock(&mutex);
        {
            let inner = MutexGuard::lock(&mutex);
            let try_inner = MutexGuard::try_lock(&mutex);
            assert!(try_inner.is_some());
            drop(try_inner);
            drop(inner);
        }
        drop(outer);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn drop_while_held_is_fatal() {
        // As for the non-reentrant mutex, the violating drop aborts instead
        // of unwinding, so it runs in a child process.
        if std::env::var_os("PLATFORM_SYNC_TEST_DROP_HELD_RECURSIVE").is_some() {
            let mutex = RecursiveMutex::new();
            mutex.lock();
            mutex.lock();
            drop(mutex);
            return;
        }

        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .arg("--exact")
            .arg("recursive::tests::drop_while_held_is_fatal")
            .env("PLATFORM_SYNC_TEST_DROP_HELD_RECURSIVE", "1")
            .status()
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unlocked more times than it was locked")]
    fn depth_underflow_is_fatal() {
        let mutex = RecursiveMutex::new();
        mutex.lock();
        unsafe {
            mutex.unlock();
            mutex.unlock();
        }
    }
}
