//! Thread-local re-entrancy guard for the observer functions.
//!
//! The capture path allocates and may hit a logging backend that itself
//! emits debug output; without a guard that would re-enter the observers on
//! the same thread and recurse. Re-entered calls skip capture and forward
//! only.

use std::cell::Cell;

thread_local! {
    static IN_OBSERVER: Cell<bool> = const { Cell::new(false) };
}

/// RAII token held while observer capture logic runs on this thread.
///
/// `enter` yields `None` when the thread is already inside an observer;
/// dropping the token re-arms the thread.
pub struct ReentryGuard(());

impl ReentryGuard {
    pub fn enter() -> Option<Self> {
        IN_OBSERVER.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(ReentryGuard(()))
            }
        })
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_OBSERVER.with(|flag| flag.set(false));
    }
}
