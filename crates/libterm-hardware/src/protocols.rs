//! Line protocols of the serial card and book readers.

use crate::line::{LineDriver, LineHooks, LineLink};
use crate::traits::LineTransport;
use crate::types::{Detection, LineConfig};
use libterm_core::NormalizationRules;
use libterm_core::constants::{DEFAULT_INIT_DELAY_MS, DEFAULT_MIN_HEX_UID_LEN};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for a serial card or book reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialReaderConfig {
    #[serde(flatten)]
    pub line: LineConfig,

    /// Command sent after every open, e.g. to enable continuous reading.
    pub init_command: Option<String>,

    pub init_delay_before_ms: u64,
    pub init_delay_after_ms: u64,

    /// Shortest hex run accepted as a UID in free text.
    pub min_hex_len: usize,
}

impl Default for SerialReaderConfig {
    fn default() -> Self {
        Self {
            line: LineConfig::default(),
            init_command: None,
            init_delay_before_ms: DEFAULT_INIT_DELAY_MS,
            init_delay_after_ms: DEFAULT_INIT_DELAY_MS,
            min_hex_len: DEFAULT_MIN_HEX_UID_LEN,
        }
    }
}

/// What a serial reader's lines carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePayload {
    /// Free text containing a hex card UID.
    CardUid,

    /// The whole line is a book tag.
    BookTag,
}

/// Hooks for serial card and book readers.
#[derive(Debug, Clone)]
pub struct SerialReaderProtocol {
    payload: LinePayload,
    init_command: Option<String>,
    delay_before: Duration,
    delay_after: Duration,
    rules: NormalizationRules,
}

impl SerialReaderProtocol {
    pub fn new(payload: LinePayload, config: &SerialReaderConfig) -> Self {
        Self {
            payload,
            init_command: config.init_command.clone().filter(|c| !c.trim().is_empty()),
            delay_before: Duration::from_millis(config.init_delay_before_ms),
            delay_after: Duration::from_millis(config.init_delay_after_ms),
            rules: NormalizationRules {
                min_hex_len: config.min_hex_len,
                ..NormalizationRules::default()
            },
        }
    }

    pub fn payload(&self) -> LinePayload {
        self.payload
    }
}

impl LineHooks for SerialReaderProtocol {
    fn opened(&mut self, link: &LineLink) {
        let Some(command) = &self.init_command else {
            return;
        };
        thread::sleep(self.delay_before);
        let sent = link.send_line(command);
        thread::sleep(self.delay_after);
        info!(command = %command, sent, "Reader init command");
    }

    fn on_line(&mut self, line: &str, _link: &LineLink) -> Option<Detection> {
        match self.payload {
            LinePayload::BookTag => Some(Detection::Tag(line.to_string())),
            LinePayload::CardUid => {
                let uid = self.rules.extract_hex_uid(line);
                if uid.is_none() {
                    debug!(line, "No UID in reader line");
                }
                uid.map(Detection::Uid)
            }
        }
    }

    fn closed(&mut self, error: &io::Error) {
        debug!(error = %error, "Reader link closed");
    }
}

/// A serial card or book reader.
pub type SerialReader = LineDriver<SerialReaderProtocol>;

impl LineDriver<SerialReaderProtocol> {
    /// A reader that reports card UIDs found in its lines.
    pub fn card_reader(
        name: impl Into<String>,
        config: &SerialReaderConfig,
        transport: Arc<dyn LineTransport>,
    ) -> Self {
        let hooks = SerialReaderProtocol::new(LinePayload::CardUid, config);
        Self::new(name, config.line.clone(), transport, hooks)
    }

    /// A reader that reports every line as a book tag.
    pub fn book_reader(
        name: impl Into<String>,
        config: &SerialReaderConfig,
        transport: Arc<dyn LineTransport>,
    ) -> Self {
        let hooks = SerialReaderProtocol::new(LinePayload::BookTag, config);
        Self::new(name, config.line.clone(), transport, hooks)
    }
}
