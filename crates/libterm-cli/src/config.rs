//! Kiosk configuration file.
//!
//! One JSON document configures the whole kiosk. Every section is optional
//! and every field falls back to the deployed defaults:
//!
//! ```json
//! {
//!   "mode": "take",
//!   "card_reader": { "port": "auto:VID_1A86&PID_7523,name=Card" },
//!   "book_readers": [{ "port": "COM7", "baud_rate": 9600 }],
//!   "contactless": { "preferred_reader": "PICC" },
//!   "actuator": { "port": "COM4" },
//!   "gate": { "take_debounce_ms": 800, "rules": { "use_epc_book_key": true } }
//! }
//! ```
//!
//! A card reader with an empty or `detect` port is looked for at startup
//! on every serial port.

use anyhow::{Context, Result};
use libterm_gate::{GateConfig, KioskMode, OperationsConfig};
use libterm_hardware::{ActuatorConfig, ContactlessConfig, ManagerConfig, SerialReaderConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    /// Mode the kiosk starts in.
    pub mode: KioskMode,

    pub manager: ManagerConfig,

    /// Serial reader that prints card UIDs.
    pub card_reader: Option<SerialReaderConfig>,

    /// Serial readers that print book tags.
    pub book_readers: Vec<SerialReaderConfig>,

    /// PC/SC contactless card reader.
    pub contactless: Option<ContactlessConfig>,

    /// Cabinet controller. Without it the kiosk logs cabinet commands only.
    pub actuator: Option<ActuatorConfig>,

    pub gate: GateConfig,
    pub operations: OperationsConfig,
}

impl KioskConfig {
    /// Read and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Number of configured identification readers.
    pub fn reader_count(&self) -> usize {
        usize::from(self.card_reader.is_some())
            + usize::from(self.contactless.is_some())
            + self.book_readers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libterm_core::GateChannel;
    use std::time::Duration;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = KioskConfig::parse("{}").unwrap();
        assert_eq!(config, KioskConfig::default());
        assert_eq!(config.mode, KioskMode::Idle);
        assert_eq!(config.reader_count(), 0);
        assert!(config.manager.book_enabled);
    }

    #[test]
    fn test_full_document() {
        let config = KioskConfig::parse(
            r#"{
                "mode": "return",
                "manager": { "book_enabled": false },
                "card_reader": { "port": "COM3", "init_command": "SCAN ON" },
                "book_readers": [{ "port": "COM7", "baud_rate": 9600 }],
                "contactless": { "preferred_reader": "ACR1281" },
                "actuator": { "port": "COM4", "reply_timeout_ms": 800 },
                "gate": { "card_debounce_ms": 400, "rules": { "use_epc_book_key": true } },
                "operations": { "require_card": false }
            }"#,
        )
        .unwrap();

        assert_eq!(config.mode, KioskMode::Return);
        assert!(!config.manager.book_enabled);
        assert_eq!(config.reader_count(), 3);

        let card = config.card_reader.as_ref().unwrap();
        assert_eq!(card.line.port.to_string(), "COM3");
        assert_eq!(card.init_command.as_deref(), Some("SCAN ON"));
        assert_eq!(config.book_readers[0].line.baud_rate, 9600);

        let actuator = config.actuator.as_ref().unwrap();
        assert_eq!(actuator.reply_timeout_ms, 800);
        assert!(!actuator.assert_modem_lines);

        assert_eq!(
            config.gate.debounce(GateChannel::Card),
            Duration::from_millis(400)
        );
        assert!(config.gate.rules.use_epc_book_key);
        assert!(!config.operations.require_card);
    }

    #[test]
    fn test_blank_card_port_means_detect() {
        let config = KioskConfig::parse(r#"{ "card_reader": { "port": "" } }"#).unwrap();
        let card = config.card_reader.as_ref().unwrap();
        assert!(card.line.port.is_detect());
    }

    #[test]
    fn test_invalid_document_rejected() {
        assert!(KioskConfig::parse(r#"{ "mode": "lend" }"#).is_err());
        assert!(KioskConfig::parse("not json").is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = KioskConfig::load(Path::new("/nonexistent/libterm.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/libterm.json"));
    }
}
