//! Win32-backed native handles.
//!
//! The exclusive and reader/writer locks are slim reader/writer locks
//! (`SRWLOCK`, a single pointer-sized word, statically initializable and
//! non-reentrant); the recursive lock is a `CRITICAL_SECTION`, which is the
//! one Win32 lock that permits same-thread re-entry. A `CRITICAL_SECTION`
//! must not move once initialized, so it is heap-allocated.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

// Opaque, sized to cover RTL_CRITICAL_SECTION on both 32- and 64-bit
// Windows.
#[allow(non_camel_case_types)]
#[repr(C, align(8))]
struct CRITICAL_SECTION {
    _opaque: MaybeUninit<[u8; 64]>,
}

#[link(name = "kernel32")]
extern "system" {
    fn AcquireSRWLockExclusive(lock: *mut usize);
    fn ReleaseSRWLockExclusive(lock: *mut usize);
    fn TryAcquireSRWLockExclusive(lock: *mut usize) -> u8;
    fn AcquireSRWLockShared(lock: *mut usize);
    fn ReleaseSRWLockShared(lock: *mut usize);
    fn TryAcquireSRWLockShared(lock: *mut usize) -> u8;

    fn InitializeCriticalSection(cs: *mut CRITICAL_SECTION);
    fn DeleteCriticalSection(cs: *mut CRITICAL_SECTION);
    fn EnterCriticalSection(cs: *mut CRITICAL_SECTION);
    fn LeaveCriticalSection(cs: *mut CRITICAL_SECTION);
    fn TryEnterCriticalSection(cs: *mut CRITICAL_SECTION) -> i32;
}

// SRWLOCK_INIT is an all-zero word.
const SRWLOCK_INIT: usize = 0;

// === impl Mutex ===

pub(crate) struct Mutex {
    lock: UnsafeCell<usize>,
}

unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub(crate) fn new() -> Self {
        Self {
            lock: UnsafeCell::new(SRWLOCK_INIT),
        }
    }

    pub(crate) fn lock(&self) {
        unsafe { AcquireSRWLockExclusive(self.lock.get()) }
    }

    pub(crate) fn try_lock(&self) -> bool {
        unsafe { TryAcquireSRWLockExclusive(self.lock.get()) != 0 }
    }

    pub(crate) unsafe fn unlock(&self) {
        unsafe { ReleaseSRWLockExclusive(self.lock.get()) }
    }
}

// === impl RecursiveMutex ===

pub(crate) struct RecursiveMutex {
    handle: Box<UnsafeCell<CRITICAL_SECTION>>,
}

unsafe impl Send for RecursiveMutex {}
unsafe impl Sync for RecursiveMutex {}

impl RecursiveMutex {
    pub(crate) fn new() -> Self {
        let handle = Box::new(UnsafeCell::new(CRITICAL_SECTION {
            _opaque: MaybeUninit::uninit(),
        }));
        unsafe { InitializeCriticalSection(handle.get()) }
        Self { handle }
    }

    pub(crate) fn lock(&self) {
        unsafe { EnterCriticalSection(self.handle.get()) }
    }

    pub(crate) fn try_lock(&self) -> bool {
        unsafe { TryEnterCriticalSection(self.handle.get()) != 0 }
    }

    pub(crate) unsafe fn unlock(&self) {
        unsafe { LeaveCriticalSection(self.handle.get()) }
    }
}

impl Drop for RecursiveMutex {
    fn drop(&mut self) {
        unsafe { DeleteCriticalSection(self.handle.get()) }
    }
}

// === impl RwLock ===

pub(crate) struct RwLock {
    lock: UnsafeCell<usize>,
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    pub(crate) fn new() -> Self {
        Self {
            lock: UnsafeCell::new(SRWLOCK_INIT),
        }
    }

    pub(crate) fn lock_shared(&self) {
        unsafe { AcquireSRWLockShared(self.lock.get()) }
    }

    pub(crate) fn try_lock_shared(&self) -> bool {
        unsafe { TryAcquireSRWLockShared(self.lock.get()) != 0 }
    }

    pub(crate) unsafe fn unlock_shared(&self) {
        unsafe { ReleaseSRWLockShared(self.lock.get()) }
    }

    pub(crate) fn lock_exclusive(&self) {
        unsafe { AcquireSRWLockExclusive(self.lock.get()) }
    }

    pub(crate) fn try_lock_exclusive(&self) -> bool {
        unsafe { TryAcquireSRWLockExclusive(self.lock.get()) != 0 }
    }

    pub(crate) unsafe fn unlock_exclusive(&self) {
        unsafe { ReleaseSRWLockExclusive(self.lock.get()) }
    }
}
