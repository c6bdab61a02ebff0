//! Low-latency mutual exclusion for short critical sections.

use crate::mutex::RawMutex;
use crate::sys;
use core::fmt;

/// A mutual exclusion lock for very short critical sections.
///
/// Semantically identical to [`Mutex`]'s blocking operations, but tuned for
/// minimal acquisition latency rather than general-purpose use. On Apple
/// platforms the lock is an `os_unfair_lock`; when the host runtime exports
/// the extended locking entry point, acquisitions request data
/// synchronization and adaptive spinning, otherwise the baseline unfair
/// lock call is used (the choice is probed once per process and cached).
/// Platforms without an unfair user-space lock fall back to the
/// general-purpose native mutex.
///
/// Unlike the other primitives in this crate, `SpinningMutex` carries no
/// debug bookkeeping at all, keeping its overhead as low as possible.
///
/// [`Mutex`]: crate::Mutex
pub struct SpinningMutex {
    native: sys::SpinLock,
}

// === impl SpinningMutex ===

impl SpinningMutex {
    /// Returns a new `SpinningMutex`, in the unlocked state.
    #[must_use]
    pub fn new() -> Self {
        trace!(target: "platform_sync::spin", "SpinningMutex::new");
        Self {
            native: sys::SpinLock::new(),
        }
    }

    /// Acquires the lock, blocking the calling thread until it exclusively
    /// owns it.
    pub fn lock(&self) {
        self.native.lock();
    }

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// May only be called by the thread currently holding the lock, paired
    /// with exactly one [`lock`].
    ///
    /// [`lock`]: SpinningMutex::lock
    pub unsafe fn unlock(&self) {
        unsafe { self.native.unlock() }
    }
}

impl Default for SpinningMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpinningMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinningMutex").finish_non_exhaustive()
    }
}

unsafe impl RawMutex for SpinningMutex {
    #[inline]
    fn lock(&self) {
        SpinningMutex::lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        unsafe { SpinningMutex::unlock(self) }
    }
}
