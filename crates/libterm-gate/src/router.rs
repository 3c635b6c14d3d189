//! Routing reader events to gate channels.
//!
//! Readers only know their role (book or card). Whether a book tag means
//! "take" or "return" depends on what the kiosk is doing, which the UI
//! sets through [`EventRouter::set_mode`].

use crate::gate::{EventGate, SubmitOutcome};
use libterm_core::{GateChannel, RawEvent, SourceChannel};
use libterm_hardware::ReaderHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, trace};

/// What the kiosk is waiting for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KioskMode {
    /// Menu screen; book tags are ignored.
    #[default]
    Idle,

    /// Issuing books.
    Take,

    /// Accepting returns.
    Return,
}

impl fmt::Display for KioskMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Take => write!(f, "take"),
            Self::Return => write!(f, "return"),
        }
    }
}

impl FromStr for KioskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "take" => Ok(Self::Take),
            "return" => Ok(Self::Return),
            other => Err(format!("unknown kiosk mode '{other}' (expected idle, take or return)")),
        }
    }
}

/// Maps reader events to gate channels from the current mode.
///
/// Cloning shares the mode.
#[derive(Debug, Clone, Default)]
pub struct EventRouter {
    mode: Arc<RwLock<KioskMode>>,
}

impl EventRouter {
    pub fn new(mode: KioskMode) -> Self {
        Self {
            mode: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn mode(&self) -> KioskMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_mode(&self, mode: KioskMode) {
        let mut current = self.mode.write().unwrap_or_else(PoisonError::into_inner);
        if *current != mode {
            info!(from = %*current, to = %mode, "Kiosk mode changed");
            *current = mode;
        }
    }

    /// The gate channel for `event`, or `None` if the kiosk is not
    /// waiting for it.
    ///
    /// ```
    /// use libterm_core::{GateChannel, RawEvent, SourceChannel};
    /// use libterm_gate::router::{EventRouter, KioskMode};
    ///
    /// let router = EventRouter::new(KioskMode::Return);
    /// let tag = RawEvent::new(SourceChannel::Book, "uhf", "304DB75F19600005000004D2");
    /// assert_eq!(router.route(&tag), Some(GateChannel::BookReturn));
    ///
    /// router.set_mode(KioskMode::Idle);
    /// assert_eq!(router.route(&tag), None);
    /// ```
    pub fn route(&self, event: &RawEvent) -> Option<GateChannel> {
        match (event.channel, self.mode()) {
            (SourceChannel::Card, _) => Some(GateChannel::Card),
            (SourceChannel::Book, KioskMode::Take) => Some(GateChannel::BookTake),
            (SourceChannel::Book, KioskMode::Return) => Some(GateChannel::BookReturn),
            (SourceChannel::Book, KioskMode::Idle) => None,
        }
    }
}

/// Counters kept by [`dispatch_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub unrouted: u64,
}

/// Submit one event to the gate.
pub fn dispatch(event: &RawEvent, router: &EventRouter, gate: &EventGate) -> Option<SubmitOutcome> {
    trace!(source = %event.source, channel = %event.channel, payload = %event.payload, "Event");
    let Some(channel) = router.route(event) else {
        debug!(source = %event.source, mode = %router.mode(), "Event ignored in current mode");
        return None;
    };
    Some(gate.submit(channel, &event.payload))
}

/// Pump reader events through the router into the gate until the reader
/// handle is closed.
///
/// Accepted actions run detached; the gate logs their outcome.
pub async fn dispatch_events(
    readers: &mut ReaderHandle,
    router: &EventRouter,
    gate: &EventGate,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    while let Some(event) = readers.recv().await {
        stats.received += 1;
        match dispatch(&event, router, gate) {
            Some(SubmitOutcome::Accepted(_)) => stats.accepted += 1,
            Some(SubmitOutcome::Dropped(_)) => stats.dropped += 1,
            None => stats.unrouted += 1,
        }
    }

    debug!(?stats, "Event pump finished");
    stats
}
