//! `os_unfair_lock`-backed spin lock for Apple platforms.
//!
//! Newer libSystem runtimes export `os_unfair_lock_lock_with_options`, which
//! lets the caller ask for data synchronization and adaptive spinning; older
//! runtimes only have the baseline `os_unfair_lock_lock`. The extended entry
//! point is resolved through `dlsym` at most once per process and the result
//! is cached, so steady-state lock calls go through a plain function
//! pointer.

use core::cell::UnsafeCell;
use core::ffi::{c_char, c_void};
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering::Relaxed};

// Not exposed by the SDK headers until macOS 15; values are ABI-stable.
const OS_UNFAIR_LOCK_DATA_SYNCHRONIZATION: u32 = 0x0001_0000;
const OS_UNFAIR_LOCK_ADAPTIVE_SPIN: u32 = 0x0004_0000;

#[allow(non_camel_case_types)]
#[repr(C)]
struct os_unfair_lock_s {
    _os_unfair_lock_opaque: u32,
}

// OS_UNFAIR_LOCK_INIT
const UNFAIR_LOCK_INIT: u32 = 0;

type LockWithOptionsFn = unsafe extern "C" fn(*mut os_unfair_lock_s, u32);

extern "C" {
    fn os_unfair_lock_lock(lock: *mut os_unfair_lock_s);
    fn os_unfair_lock_unlock(lock: *mut os_unfair_lock_s);

    fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
}

const RTLD_DEFAULT: *mut c_void = -2isize as *mut c_void;

// Null until the first probe; `MISSING` when the host runtime does not
// export the extended entry point. The probe is idempotent, so a racing
// double-probe is harmless and relaxed ordering suffices.
static LOCK_WITH_OPTIONS: AtomicPtr<c_void> = AtomicPtr::new(ptr::null_mut());
const MISSING: *mut c_void = 1 as *mut c_void;

fn lock_with_options() -> Option<LockWithOptionsFn> {
    let mut sym = LOCK_WITH_OPTIONS.load(Relaxed);
    if sym.is_null() {
        sym = unsafe {
            dlsym(
                RTLD_DEFAULT,
                b"os_unfair_lock_lock_with_options\0".as_ptr().cast(),
            )
        };
        if sym.is_null() {
            sym = MISSING;
        }
        trace!(
            target: "platform_sync::spin",
            available = sym != MISSING,
            "probed os_unfair_lock_lock_with_options",
        );
        LOCK_WITH_OPTIONS.store(sym, Relaxed);
    }
    if sym == MISSING {
        None
    } else {
        // Non-null, non-sentinel values only ever come from the dlsym call
        // above, so this is the symbol's entry point.
        Some(unsafe { mem::transmute::<*mut c_void, LockWithOptionsFn>(sym) })
    }
}

// === impl SpinLock ===

pub(crate) struct SpinLock {
    lock: UnsafeCell<os_unfair_lock_s>,
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

impl SpinLock {
    pub(crate) fn new() -> Self {
        Self {
            lock: UnsafeCell::new(os_unfair_lock_s {
                _os_unfair_lock_opaque: UNFAIR_LOCK_INIT,
            }),
        }
    }

    pub(crate) fn lock(&self) {
        match lock_with_options() {
            Some(lock_fn) => {
                let options = OS_UNFAIR_LOCK_DATA_SYNCHRONIZATION | OS_UNFAIR_LOCK_ADAPTIVE_SPIN;
                unsafe { lock_fn(self.lock.get(), options) }
            }
            None => unsafe { os_unfair_lock_lock(self.lock.get()) },
        }
    }

    pub(crate) unsafe fn unlock(&self) {
        unsafe { os_unfair_lock_unlock(self.lock.get()) }
    }
}
