//! Cooperative cancellation for driver threads.

use libterm_core::constants::STOP_JOIN_TIMEOUT_MS;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

/// Stop flag shared between a driver and its background thread.
///
/// Sleeps taken through [`StopSignal::sleep`] wake up as soon as the flag
/// is raised, so a loop waiting out a reconnect delay stops promptly.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every sleeper.
    pub fn stop(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless stopped first.
    ///
    /// Returns `true` if the whole duration elapsed, `false` if the flag
    /// was raised.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = wake
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        !*guard
    }
}

/// Join a driver thread, giving up after the stop timeout.
///
/// A thread stuck in a blocking vendor or OS call is detached rather than
/// allowed to hang shutdown.
pub(crate) fn join_bounded(handle: JoinHandle<()>, device: &str) {
    let deadline = Instant::now() + Duration::from_millis(STOP_JOIN_TIMEOUT_MS);

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(device, "Driver thread did not stop in time, detaching");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }

    if handle.join().is_err() {
        warn!(device, "Driver thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_runs_full_duration() {
        let stop = StopSignal::new();
        let started = Instant::now();
        assert!(stop.sleep(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_stop_interrupts_sleep() {
        let stop = StopSignal::new();
        let remote = stop.clone();

        let sleeper = thread::spawn(move || remote.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        stop.stop();

        assert!(!sleeper.join().unwrap());
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_sleep_after_stop_returns_immediately() {
        let stop = StopSignal::new();
        stop.stop();
        let started = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_join_bounded_detaches_stuck_thread() {
        let stuck = thread::spawn(|| thread::sleep(Duration::from_secs(3)));
        let started = Instant::now();
        join_bounded(stuck, "stuck");
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
