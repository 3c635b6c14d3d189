//! Observer registry for driver events.
//!
//! Drivers run on their own threads and publish [`DeviceEvent`]s to any
//! number of subscribers. Emission works on a snapshot of the subscriber
//! list, so a callback may subscribe or unsubscribe while being called,
//! and every callback is isolated: a panicking subscriber is logged and
//! skipped without disturbing the driver loop or the other subscribers.
//!
//! Callbacks run on the driver thread and must not block.
//!
//! # Examples
//!
//! ```
//! use libterm_hardware::events::Subscribers;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let subscribers = Subscribers::<u32>::new();
//! let total = Arc::new(AtomicUsize::new(0));
//!
//! let sink = Arc::clone(&total);
//! let id = subscribers.subscribe(move |n| {
//!     sink.fetch_add(*n as usize, Ordering::SeqCst);
//! });
//!
//! subscribers.emit(&5);
//! assert!(subscribers.unsubscribe(id));
//! subscribers.emit(&5);
//!
//! assert_eq!(total.load(Ordering::SeqCst), 5);
//! ```

use crate::types::{ConnectionState, DeviceEvent};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A cloneable, thread-safe list of event callbacks.
pub struct Subscribers<T> {
    entries: Arc<Mutex<Vec<(SubscriptionId, Callback<T>)>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Call every subscriber with `event`.
    ///
    /// Returns how many callbacks completed without panicking.
    pub fn emit(&self, event: &T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        let mut delivered = 0;
        for callback in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!("Event subscriber panicked, continuing"),
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Callback<T>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

/// Connection state of one driver, publishing every transition.
#[derive(Debug)]
pub(crate) struct StateTracker {
    device: String,
    state: Mutex<ConnectionState>,
    subscribers: Subscribers<DeviceEvent>,
}

impl StateTracker {
    pub(crate) fn new(device: impl Into<String>, subscribers: Subscribers<DeviceEvent>) -> Self {
        Self {
            device: device.into(),
            state: Mutex::new(ConnectionState::Disconnected),
            subscribers,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`; emits `StateChanged` only on an actual change.
    pub(crate) fn set(&self, next: ConnectionState) {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = *state != next;
            *state = next;
            changed
        };

        if changed {
            debug!(device = %self.device, state = %next, "Connection state changed");
            self.subscribers.emit(&DeviceEvent::StateChanged {
                device: self.device.clone(),
                state: next,
            });
        }
    }
}
