//! Reader manager.
//!
//! This module provides the [`ReaderManager`], which owns every configured
//! reader, tags each reader's identifiers with the role it plays in the
//! kiosk and funnels them into one bounded channel for the event gate.
//!
//! # Architecture
//!
//! Readers run on their own threads and publish to their subscribers. The
//! manager subscribes one forwarder per reader that turns `UidFound` and
//! `TagFound` into a [`RawEvent`] and pushes it into the channel without
//! blocking. A full channel drops the event with a warning; the reader
//! thread never waits on the consumer.
//!
//! ```text
//! ┌──────────────┐  UidFound
//! │ Card reader  │───────────┐
//! └──────────────┘           ▼
//!                      ┌───────────┐   RawEvent    ┌───────────┐
//!                      │ forwarder │──────────────►│  channel  │──► gate
//!                      └───────────┘   (role tag)  │  (mpsc)   │
//! ┌──────────────┐           ▲                     └───────────┘
//! │ Book reader  │───────────┘
//! └──────────────┘  TagFound
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use libterm_core::SourceChannel;
//! use libterm_hardware::manager::{ManagerConfig, ReaderManager};
//! use libterm_hardware::mock::MockLineTransport;
//! use libterm_hardware::protocols::{SerialReader, SerialReaderConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> libterm_hardware::Result<()> {
//!     let (transport, _handle) = MockLineTransport::new();
//!     let reader = SerialReader::card_reader(
//!         "card",
//!         &SerialReaderConfig::default(),
//!         Arc::new(transport),
//!     );
//!
//!     let mut manager = ReaderManager::new(ManagerConfig::default());
//!     manager.register(SourceChannel::Card, reader.into());
//!
//!     let mut handle = manager.start();
//!     while let Some(event) = handle.recv().await {
//!         println!("{} read {}", event.source, event.payload);
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```

use crate::devices::AnyReader;
use crate::error::{HardwareError, Result};
use crate::traits::ReaderDevice;
use crate::types::{ConnectionState, DeviceEvent, ReaderKind};
use libterm_core::constants::DEFAULT_EVENT_CAPACITY;
use libterm_core::{RawEvent, SourceChannel};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Which reader roles are started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub book_enabled: bool,
    pub card_enabled: bool,

    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            book_enabled: true,
            card_enabled: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// A reader that failed to start.
#[derive(Debug)]
pub struct StartupFailure {
    pub reader: String,
    pub role: SourceChannel,
    pub error: HardwareError,
}

/// Snapshot of one running reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStatus {
    pub name: String,
    pub role: SourceChannel,
    pub kind: ReaderKind,
    pub state: ConnectionState,
}

/// Owns the readers and hands out their events.
#[derive(Debug)]
pub struct ReaderManager {
    config: ManagerConfig,
    readers: Vec<(SourceChannel, AnyReader)>,
}

impl ReaderManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            readers: Vec::new(),
        }
    }

    /// Register a reader for `role`. Several readers may share a role.
    pub fn register(&mut self, role: SourceChannel, reader: AnyReader) {
        self.readers.push((role, reader));
    }

    /// Whether readers registered for `role` will be started.
    pub fn is_role_enabled(&self, role: SourceChannel) -> bool {
        match role {
            SourceChannel::Book => self.config.book_enabled,
            SourceChannel::Card => self.config.card_enabled,
        }
    }

    /// Start every enabled reader and return the event handle.
    ///
    /// A reader that fails to start is reported in
    /// [`ReaderHandle::startup_failures`]; the others keep running.
    pub fn start(self) -> ReaderHandle {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity.max(1));
        let mut running = Vec::new();
        let mut failures = Vec::new();

        for (role, mut reader) in self.readers {
            let enabled = match role {
                SourceChannel::Book => self.config.book_enabled,
                SourceChannel::Card => self.config.card_enabled,
            };
            if !enabled {
                debug!(reader = reader.name(), %role, "Reader role disabled");
                continue;
            }

            let tx = event_tx.clone();
            let subscription = reader
                .events()
                .subscribe(move |event: &DeviceEvent| forward(role, event, &tx));

            match reader.start() {
                Ok(()) => {
                    info!(reader = reader.name(), %role, kind = %reader.kind(), "Reader started");
                    running.push((role, reader));
                }
                Err(e) => {
                    error!(reader = reader.name(), %role, error = %e, "Reader failed to start");
                    reader.events().unsubscribe(subscription);
                    failures.push(StartupFailure {
                        reader: reader.name().to_string(),
                        role,
                        error: e,
                    });
                }
            }
        }

        ReaderHandle {
            event_rx,
            readers: running,
            failures,
        }
    }
}

fn forward(role: SourceChannel, event: &DeviceEvent, tx: &mpsc::Sender<RawEvent>) {
    let raw = match event {
        DeviceEvent::UidFound { device, uid } => RawEvent::new(role, device.as_str(), uid.as_str()),
        DeviceEvent::TagFound { device, tag } => RawEvent::new(role, device.as_str(), tag.as_str()),
        _ => return,
    };

    match tx.try_send(raw) {
        Ok(()) => {}
        Err(TrySendError::Full(raw)) => {
            warn!(reader = %raw.source, payload = %raw.payload, "Event channel full, event dropped");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

/// Receives reader events and stops the readers.
#[derive(Debug)]
pub struct ReaderHandle {
    event_rx: mpsc::Receiver<RawEvent>,
    readers: Vec<(SourceChannel, AnyReader)>,
    failures: Vec<StartupFailure>,
}

impl ReaderHandle {
    /// Receive the next identifier from any reader.
    ///
    /// Returns `None` once the handle has been shut down.
    pub async fn recv(&mut self) -> Option<RawEvent> {
        self.event_rx.recv().await
    }

    /// Readers that failed to start.
    pub fn startup_failures(&self) -> &[StartupFailure] {
        &self.failures
    }

    /// Number of running readers.
    pub fn running(&self) -> usize {
        self.readers.len()
    }

    /// Current state of every running reader.
    pub fn statuses(&self) -> Vec<ReaderStatus> {
        self.readers
            .iter()
            .map(|(role, reader)| ReaderStatus {
                name: reader.name().to_string(),
                role: *role,
                kind: reader.kind(),
                state: reader.state(),
            })
            .collect()
    }

    /// Stop every reader and release its hardware.
    ///
    /// Readers are stopped in parallel on the blocking pool. A reader whose
    /// stop panics is logged; shutdown itself does not fail.
    pub async fn shutdown(mut self) -> Result<()> {
        self.event_rx.close();

        let mut tasks = JoinSet::new();
        for (_, mut reader) in self.readers.drain(..) {
            tasks.spawn_blocking(move || {
                reader.stop();
                reader.name().to_string()
            });
        }

        let mut panics = 0;
        while let Some(result) = tasks.join_next().await {
            match classify_task_result(&result) {
                TaskTermination::Stopped => {
                    if let Ok(name) = result {
                        debug!(reader = %name, "Reader stopped");
                    }
                }
                TaskTermination::Cancelled => {}
                TaskTermination::Panic => panics += 1,
            }
        }

        if panics > 0 {
            warn!(panics, "Some readers panicked while stopping");
        }
        info!("All readers stopped");
        Ok(())
    }
}

/// Task termination classification for shutdown handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    Stopped,
    Cancelled,
    Panic,
}

fn classify_task_result<T>(
    result: &std::result::Result<T, tokio::task::JoinError>,
) -> TaskTermination {
    match result {
        Ok(_) => TaskTermination::Stopped,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}
