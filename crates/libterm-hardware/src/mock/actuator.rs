//! Recording cabinet actuator.

use crate::error::{HardwareError, Result};
use crate::traits::CabinetActuator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Actuator that records every command it receives.
///
/// ```
/// use libterm_hardware::mock::RecordingActuator;
/// use libterm_hardware::traits::CabinetActuator;
///
/// let actuator = RecordingActuator::new();
/// actuator.set_space(false);
/// assert!(!actuator.has_space());
/// actuator.send_error();
/// assert_eq!(actuator.commands(), vec!["SPACE?", "ERR"]);
/// ```
#[derive(Debug, Clone)]
pub struct RecordingActuator {
    commands: Arc<Mutex<Vec<String>>>,
    space: Arc<AtomicBool>,
    online: Arc<AtomicBool>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self {
            commands: Arc::default(),
            space: Arc::new(AtomicBool::new(true)),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_space(&self, space: bool) {
        self.space.store(space, Ordering::SeqCst);
    }

    /// An offline actuator fails `open_bin`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, command: impl Into<String>) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.into());
    }
}

impl Default for RecordingActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl CabinetActuator for RecordingActuator {
    fn has_space(&self) -> bool {
        self.record("SPACE?");
        self.space.load(Ordering::SeqCst)
    }

    fn open_bin(&self) -> Result<()> {
        self.record("OPEN");
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HardwareError::disconnected("recording actuator"))
        }
    }

    fn send_ok(&self) {
        self.record("OK");
    }

    fn send_error(&self) {
        self.record("ERR");
    }

    fn send_beep(&self, duration_ms: u32) {
        self.record(format!("BEEP:{duration_ms}"));
    }
}
