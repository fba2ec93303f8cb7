use std::{
    sync::{
        Condvar, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;

/// One-shot termination signal shared by every worker of a run.
///
/// The flag can be polled cheaply with [`Stop::get`]. Workers that need to
/// wait use [`Stop::sleep`], which returns as soon as the signal is raised
/// instead of running to the end of the requested duration.
#[derive(Debug)]
pub struct Stop {
    stopped: AtomicBool,
    lock: Mutex<()>,
    signal: Condvar,
}

/// Returned when a wait was interrupted by the [`Stop`] signal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Simulation terminated")]
pub struct Cancelled;

/// total ordering: the flag is read by every worker between two messages
/// and must never be observed out of order with the notification.
const ORDERING: Ordering = Ordering::SeqCst;

impl Stop {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            lock: Mutex::new(()),
            signal: Condvar::new(),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.stopped.load(ORDERING)
    }

    /// set the stop signal and wake every sleeping worker
    ///
    /// returns `true` only for the call that actually raised the signal,
    /// the signal is never lowered again.
    pub fn toggle(&self) -> bool {
        // hold the lock so a worker between its flag check and its wait
        // cannot miss the notification
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let first = !self.stopped.swap(true, ORDERING);
        self.signal.notify_all();
        first
    }

    /// Suspend the calling thread for `duration` or until the signal is raised.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        // a deadline beyond what `Instant` can represent means "forever"
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.get() {
                return Err(Cancelled);
            }

            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    deadline - now
                }
                None => Duration::from_secs(3_600),
            };

            guard = self
                .signal
                .wait_timeout(guard, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Default for Stop {
    fn default() -> Self {
        Self::new()
    }
}
