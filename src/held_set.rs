//! Per-thread tracking of held [`SharedMutex`](crate::SharedMutex) instances.
//!
//! Used by the debug assertions that guarantee a thread never acquires the
//! same shared mutex twice concurrently. Instances are keyed by address.
//! Most threads hold at most one shared mutex at a time, so the common case
//! lives in the inline `Single` slot; a set is only allocated once a thread
//! holds two distinct instances simultaneously, and is freed again as soon
//! as it empties.
//!
//! The state is process-wide but partitioned per thread: each thread only
//! ever reads and writes its own slot, so no synchronization is needed and
//! the tracker adds no lock contention of its own.

use std::cell::RefCell;
use std::collections::HashSet;

#[derive(Debug)]
enum Held {
    Empty,
    Single(usize),
    Many(HashSet<usize>),
}

std::thread_local! {
    static HELD: RefCell<Held> = const { RefCell::new(Held::Empty) };
}

/// Returns `true` iff `addr` is not currently held by this thread.
pub(crate) fn not_held(addr: usize) -> bool {
    HELD.with(|held| match &*held.borrow() {
        Held::Empty => true,
        Held::Single(existing) => *existing != addr,
        Held::Many(set) => !set.contains(&addr),
    })
}

/// Records `addr` as held by this thread. Returns `true` iff it was not
/// already held.
pub(crate) fn try_hold(addr: usize) -> bool {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        match &mut *held {
            Held::Empty => {
                *held = Held::Single(addr);
                true
            }
            Held::Single(existing) if *existing == addr => false,
            Held::Single(existing) => {
                *held = Held::Many(HashSet::from([*existing, addr]));
                true
            }
            Held::Many(set) => set.insert(addr),
        }
    })
}

/// Clears `addr` from this thread's held set. Returns `true` iff it was
/// held.
pub(crate) fn try_release(addr: usize) -> bool {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        match &mut *held {
            Held::Empty => false,
            Held::Single(existing) if *existing == addr => {
                *held = Held::Empty;
                true
            }
            Held::Single(_) => false,
            Held::Many(set) => {
                let removed = set.remove(&addr);
                if removed && set.is_empty() {
                    // The last hold is gone; free the set so the next hold
                    // goes back through the inline slot.
                    *held = Held::Empty;
                }
                removed
            }
        }
    })
}

#[cfg(test)]
fn with_state<T>(f: impl FnOnce(&Held) -> T) -> T {
    HELD.with(|held| f(&held.borrow()))
}
