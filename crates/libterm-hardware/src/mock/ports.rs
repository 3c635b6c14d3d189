//! Mock serial port enumeration.

use crate::traits::SerialPorts;
use libterm_core::PortDescriptor;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Fixed port list; nudges are recorded and always succeed.
#[derive(Debug, Clone, Default)]
pub struct MockSerialPorts {
    ports: Vec<PortDescriptor>,
    nudged: Arc<Mutex<Vec<(String, u32)>>>,
}

impl MockSerialPorts {
    pub fn new(ports: Vec<PortDescriptor>) -> Self {
        Self {
            ports,
            nudged: Arc::default(),
        }
    }

    /// Ports given by name only.
    pub fn named(names: &[&str]) -> Self {
        Self::new(names.iter().copied().map(PortDescriptor::named).collect())
    }

    /// `(port, baud)` of every nudge, in order.
    pub fn nudged(&self) -> Vec<(String, u32)> {
        self.nudged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SerialPorts for MockSerialPorts {
    fn list(&self) -> Vec<PortDescriptor> {
        self.ports.clone()
    }

    fn nudge(&self, port: &str, baud_rate: u32, _hold: Duration) -> io::Result<()> {
        self.nudged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((port.to_string(), baud_rate));
        Ok(())
    }
}
