//! Native lock handles.
//!
//! Each handle is an opaque OS-owned resource, exclusively owned by the
//! primitive instance wrapping it: created at construction, destroyed when
//! the instance is dropped. Which backend a primitive compiles against is
//! decided here, at build time; the only runtime branch is the Apple
//! spin-lock capability probe in [`unfair`].

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use self::unix::{Mutex, RecursiveMutex, RwLock};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use self::windows::{Mutex, RecursiveMutex, RwLock};

#[cfg(target_vendor = "apple")]
mod unfair;
#[cfg(target_vendor = "apple")]
pub(crate) use self::unfair::SpinLock;

/// Hosts without an unfair user-space lock fall back to the general-purpose
/// mutual exclusion lock.
#[cfg(not(target_vendor = "apple"))]
pub(crate) type SpinLock = Mutex;
