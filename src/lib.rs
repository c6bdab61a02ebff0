#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations)]

#[macro_use]
mod util;

#[cfg(debug_assertions)]
pub(crate) mod held_set;
pub(crate) mod sys;

pub mod mutex;
pub mod recursive;
pub mod rwlock;
pub mod spin;

#[doc(inline)]
pub use self::mutex::{Mutex, MutexGuard, RawMutex, RawTryMutex};
#[doc(inline)]
pub use self::recursive::RecursiveMutex;
#[doc(inline)]
pub use self::rwlock::{ExclusiveGuard, SharedGuard, SharedMutex};
#[doc(inline)]
pub use self::spin::SpinningMutex;
