//! pthread-backed native handles.
//!
//! The pthread types are declared as opaque byte blobs sized to cover every
//! supported libc, and are heap-allocated so that their addresses stay
//! stable for the lifetime of the wrapping primitive (a pthread lock must
//! not move once initialized).

use core::cell::UnsafeCell;
use core::ffi::c_int;
use core::mem::MaybeUninit;
use core::ptr;

#[allow(non_camel_case_types)]
#[repr(C, align(16))]
struct pthread_mutex_t {
    _opaque: MaybeUninit<[u8; 64]>,
}

#[allow(non_camel_case_types)]
#[repr(C, align(16))]
struct pthread_mutexattr_t {
    _opaque: MaybeUninit<[u8; 16]>,
}

#[allow(non_camel_case_types)]
#[repr(C, align(16))]
struct pthread_rwlock_t {
    _opaque: MaybeUninit<[u8; 256]>,
}

#[allow(non_camel_case_types)]
#[repr(C, align(16))]
struct pthread_rwlockattr_t {
    _opaque: MaybeUninit<[u8; 32]>,
}

#[link(name = "c")]
extern "C" {
    fn pthread_mutex_init(m: *mut pthread_mutex_t, attr: *const pthread_mutexattr_t) -> c_int;
    fn pthread_mutex_destroy(m: *mut pthread_mutex_t) -> c_int;
    fn pthread_mutex_lock(m: *mut pthread_mutex_t) -> c_int;
    fn pthread_mutex_trylock(m: *mut pthread_mutex_t) -> c_int;
    fn pthread_mutex_unlock(m: *mut pthread_mutex_t) -> c_int;

    fn pthread_mutexattr_init(attr: *mut pthread_mutexattr_t) -> c_int;
    fn pthread_mutexattr_settype(attr: *mut pthread_mutexattr_t, kind: c_int) -> c_int;
    fn pthread_mutexattr_destroy(attr: *mut pthread_mutexattr_t) -> c_int;

    fn pthread_rwlock_init(l: *mut pthread_rwlock_t, attr: *const pthread_rwlockattr_t) -> c_int;
    fn pthread_rwlock_destroy(l: *mut pthread_rwlock_t) -> c_int;
    fn pthread_rwlock_rdlock(l: *mut pthread_rwlock_t) -> c_int;
    fn pthread_rwlock_tryrdlock(l: *mut pthread_rwlock_t) -> c_int;
    fn pthread_rwlock_wrlock(l: *mut pthread_rwlock_t) -> c_int;
    fn pthread_rwlock_trywrlock(l: *mut pthread_rwlock_t) -> c_int;
    fn pthread_rwlock_unlock(l: *mut pthread_rwlock_t) -> c_int;
}

const EBUSY: c_int = 16;

#[cfg(target_vendor = "apple")]
const PTHREAD_MUTEX_RECURSIVE: c_int = 2;
#[cfg(not(target_vendor = "apple"))]
const PTHREAD_MUTEX_RECURSIVE: c_int = 1;

// === impl Mutex ===

pub(crate) struct Mutex {
    handle: Box<UnsafeCell<pthread_mutex_t>>,
}

// The handle is only ever accessed through the pthread entry points, which
// are the synchronization.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    pub(crate) fn new() -> Self {
        let handle = Box::new(UnsafeCell::new(pthread_mutex_t {
            _opaque: MaybeUninit::uninit(),
        }));
        let rc = unsafe { pthread_mutex_init(handle.get(), ptr::null()) };
        debug_assert_eq!(rc, 0);
        Self { handle }
    }

    pub(crate) fn lock(&self) {
        let rc = unsafe { pthread_mutex_lock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }

    pub(crate) fn try_lock(&self) -> bool {
        match unsafe { pthread_mutex_trylock(self.handle.get()) } {
            0 => true,
            rc => {
                debug_assert_eq!(rc, EBUSY);
                false
            }
        }
    }

    pub(crate) unsafe fn unlock(&self) {
        let rc = unsafe { pthread_mutex_unlock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        let rc = unsafe { pthread_mutex_destroy(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }
}

// === impl RecursiveMutex ===

pub(crate) struct RecursiveMutex {
    handle: Box<UnsafeCell<pthread_mutex_t>>,
}

unsafe impl Send for RecursiveMutex {}
unsafe impl Sync for RecursiveMutex {}

impl RecursiveMutex {
    pub(crate) fn new() -> Self {
        let handle = Box::new(UnsafeCell::new(pthread_mutex_t {
            _opaque: MaybeUninit::uninit(),
        }));
        unsafe {
            let mut attr = pthread_mutexattr_t {
                _opaque: MaybeUninit::uninit(),
            };
            let rc = pthread_mutexattr_init(&mut attr);
            debug_assert_eq!(rc, 0);
            let rc = pthread_mutexattr_settype(&mut attr, PTHREAD_MUTEX_RECURSIVE);
            debug_assert_eq!(rc, 0);
            let rc = pthread_mutex_init(handle.get(), &attr);
            debug_assert_eq!(rc, 0);
            let rc = pthread_mutexattr_destroy(&mut attr);
            debug_assert_eq!(rc, 0);
        }
        Self { handle }
    }

    pub(crate) fn lock(&self) {
        let rc = unsafe { pthread_mutex_lock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }

    pub(crate) fn try_lock(&self) -> bool {
        match unsafe { pthread_mutex_trylock(self.handle.get()) } {
            0 => true,
            rc => {
                debug_assert_eq!(rc, EBUSY);
                false
            }
        }
    }

    pub(crate) unsafe fn unlock(&self) {
        let rc = unsafe { pthread_mutex_unlock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }
}

impl Drop for RecursiveMutex {
    fn drop(&mut self) {
        let rc = unsafe { pthread_mutex_destroy(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }
}

// === impl RwLock ===

pub(crate) struct RwLock {
    handle: Box<UnsafeCell<pthread_rwlock_t>>,
}

unsafe impl Send for RwLock {}
unsafe impl Sync for RwLock {}

impl RwLock {
    pub(crate) fn new() -> Self {
        let handle = Box::new(UnsafeCell::new(pthread_rwlock_t {
            _opaque: MaybeUninit::uninit(),
        }));
        let rc = unsafe { pthread_rwlock_init(handle.get(), ptr::null()) };
        debug_assert_eq!(rc, 0);
        Self { handle }
    }

    pub(crate) fn lock_shared(&self) {
        let rc = unsafe { pthread_rwlock_rdlock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }

    // Busy and reader-overflow both just mean "unavailable" here.
    pub(crate) fn try_lock_shared(&self) -> bool {
        unsafe { pthread_rwlock_tryrdlock(self.handle.get()) == 0 }
    }

    pub(crate) unsafe fn unlock_shared(&self) {
        let rc = unsafe { pthread_rwlock_unlock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }

    pub(crate) fn lock_exclusive(&self) {
        let rc = unsafe { pthread_rwlock_wrlock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }

    pub(crate) fn try_lock_exclusive(&self) -> bool {
        unsafe { pthread_rwlock_trywrlock(self.handle.get()) == 0 }
    }

    pub(crate) unsafe fn unlock_exclusive(&self) {
        let rc = unsafe { pthread_rwlock_unlock(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }
}

impl Drop for RwLock {
    fn drop(&mut self) {
        let rc = unsafe { pthread_rwlock_destroy(self.handle.get()) };
        debug_assert_eq!(rc, 0);
    }
}
