//! The clock/timer service: schedules one-shot delayed callbacks, used for
//! restart backoff. Each scheduled callback runs on its own short-lived
//! thread that sleeps for the delay and then fires exactly once; cancellation
//! is not modeled here because it doesn't need to be — the callback closures
//! close over a child's `generation` and the engine loop discards a timer
//! whose generation no longer matches (see [`crate::child::Child`]).

use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct Clock;

impl Clock {
    pub fn new() -> Self {
        Clock
    }

    /// Runs `f` once, `delay` from now, on a dedicated thread.
    pub fn schedule<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            f();
        });
    }
}
