//! Common test utilities for driver integration tests.
//!
//! Drivers run on their own threads, so tests observe them by polling:
//! [`wait_until`] spins on a condition with a deadline and
//! [`EventLog`] collects everything a driver emits.

#![allow(dead_code)]

use libterm_hardware::{ConnectionState, DeviceEvent, Subscribers};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Generous upper bound for anything a driver thread should do promptly.
pub const SETTLE: Duration = Duration::from_secs(3);

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns whether it held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Records every event a driver emits.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
}

impl EventLog {
    pub fn attach(subscribers: &Subscribers<DeviceEvent>) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        subscribers.subscribe(move |event: &DeviceEvent| {
            sink.lock().unwrap().push(event.clone());
        });
        log
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::LineReceived { line, .. } => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn uids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::UidFound { uid, .. } => Some(uid),
                _ => None,
            })
            .collect()
    }

    pub fn tags(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::TagFound { tag, .. } => Some(tag),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }
}
