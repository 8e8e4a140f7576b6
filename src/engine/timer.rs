//! One-shot deadline timer backed by a dedicated thread.
//!
//! The engine needs a re-armable one-shot: re-arm moves the deadline,
//! firing is edge-triggered, and tear-down synchronizes with an in-flight
//! callback.  A thread parked on a condvar gives exactly that on a host OS
//! without dragging in an async time driver.
//!
//! Arming while armed replaces the deadline; `cancel` clears it without
//! waking the expiry path.  `stop` makes `run` return so the owner can
//! join the thread; after an in-progress callback finishes, no further
//! callbacks are delivered.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Slot {
    deadline: Option<Instant>,
    stopped: bool,
}

/// Shared state between the arming side and the expiry thread.
pub(crate) struct DelayTimer {
    slot: Mutex<Slot>,
    cv: Condvar,
}

impl DelayTimer {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            cv: Condvar::new(),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or re-arm) the timer for an absolute deadline.
    pub(crate) fn arm_at(&self, at: Instant) {
        self.slot().deadline = Some(at);
        self.cv.notify_all();
    }

    /// Arm (or re-arm) the timer relative to now.
    pub(crate) fn arm_in(&self, after: Duration) {
        self.arm_at(Instant::now() + after);
    }

    /// Disarm without firing.  A concurrent expiry that already passed the
    /// deadline check may still deliver one callback; callers tolerate
    /// stale fires by re-validating their own pending state.
    pub(crate) fn cancel(&self) {
        self.slot().deadline = None;
    }

    /// Ask `run` to return.  Does not wait; join the thread for that.
    pub(crate) fn stop(&self) {
        self.slot().stopped = true;
        self.cv.notify_all();
    }

    /// Expiry loop; the body of the timer thread.  Calls `on_expire` once
    /// per reached deadline, with no lock held.
    pub(crate) fn run(&self, on_expire: impl Fn()) {
        let mut slot = self.slot();
        loop {
            if slot.stopped {
                return;
            }
            match slot.deadline {
                None => {
                    slot = self
                        .cv
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        slot.deadline = None;
                        drop(slot);
                        on_expire();
                        slot = self.slot();
                    } else {
                        slot = self
                            .cv
                            .wait_timeout(slot, deadline - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                }
            }
        }
    }
}
