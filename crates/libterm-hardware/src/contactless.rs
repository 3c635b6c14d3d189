//! PC/SC contactless polling driver.
//!
//! Every cycle works on fresh handles, so a reader that was unplugged or
//! grabbed by another process recovers on the next cycle without special
//! casing:
//!
//! ```text
//! establish context ─► list readers ─► pick preferred ─► connect (≤ N tries)
//!        ▲                                                    │
//!        │                                          transmit FF CA 00 00 00
//!        │                                                    │
//!        └── sleep poll interval ◄── release context ◄── disconnect (leave card)
//! ```
//!
//! Connect failures are classified: a sharing violation waits the busy
//! delay and retries, "no card" waits the poll interval and retries, and
//! anything else ends the cycle. A non-success status word is simply "no
//! UID this cycle". Nothing that goes wrong inside a cycle stops the loop.

use crate::cancel::{StopSignal, join_bounded};
use crate::error::{HardwareError, Result};
use crate::events::{StateTracker, Subscribers};
use crate::traits::{CardService, CardServiceError, ReaderDevice};
use crate::types::{ConnectionState, DeviceEvent, ReaderKind};
use libterm_core::constants::{
    DEFAULT_BUSY_RETRY_DELAY_MS, DEFAULT_CONNECT_RETRIES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PREFERRED_READER,
};
use libterm_core::hex;
use libterm_protocol::apdu::{GET_UID_APDU, StatusWord, UidResponse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Contactless reader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactlessConfig {
    /// Case-insensitive substring of the reader name to prefer.
    pub preferred_reader: String,

    pub poll_interval_ms: u64,

    /// Connect attempts per cycle.
    pub connect_retries: u32,

    /// Wait after a sharing violation.
    pub busy_retry_delay_ms: u64,
}

impl ContactlessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn busy_retry_delay(&self) -> Duration {
        Duration::from_millis(self.busy_retry_delay_ms)
    }
}

impl Default for ContactlessConfig {
    fn default() -> Self {
        Self {
            preferred_reader: DEFAULT_PREFERRED_READER.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            busy_retry_delay_ms: DEFAULT_BUSY_RETRY_DELAY_MS,
        }
    }
}

/// Result of one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A card answered with its UID, dash-separated hex.
    Uid(String),

    /// The card answered success without UID bytes.
    NoCard,

    /// The service lists no readers.
    NoReader,

    /// The card answered with a non-success status word.
    StatusNotSuccess(StatusWord),

    /// Every connect attempt was refused with a retryable error.
    RetriesExhausted {
        attempts: u32,
        last: CardServiceError,
    },

    /// A non-retryable service failure ended the cycle.
    Failed(CardServiceError),

    /// A stop was requested mid-cycle.
    Cancelled,
}

/// Pick the first reader whose name contains `preferred`
/// (case-insensitive), else the first reader.
///
/// ```
/// use libterm_hardware::contactless::select_reader;
///
/// let readers = vec![
///     "ACS ACR1281 1S Dual Reader ICC 0".to_string(),
///     "ACS ACR1281 1S Dual Reader PICC 0".to_string(),
/// ];
/// assert_eq!(select_reader(&readers, "picc"), Some(readers[1].as_str()));
/// assert_eq!(select_reader(&readers, "SAM"), Some(readers[0].as_str()));
/// assert_eq!(select_reader(&[], "PICC"), None);
/// ```
pub fn select_reader<'a>(readers: &'a [String], preferred: &str) -> Option<&'a str> {
    let needle = preferred.to_lowercase();
    readers
        .iter()
        .find(|name| !needle.is_empty() && name.to_lowercase().contains(&needle))
        .or_else(|| readers.first())
        .map(String::as_str)
}

/// One-cycle poller shared by the driver thread and tests.
#[derive(Clone)]
pub struct CardPoller {
    service: Arc<dyn CardService>,
    config: ContactlessConfig,
    stop: StopSignal,
}

impl CardPoller {
    pub fn new(service: Arc<dyn CardService>, config: ContactlessConfig, stop: StopSignal) -> Self {
        Self {
            service,
            config,
            stop,
        }
    }

    /// Run a single cycle.
    ///
    /// All handles acquired during the cycle are released before this
    /// returns: the card session is dropped before its context.
    pub fn poll_once(&self) -> CycleOutcome {
        let context = match self.service.establish() {
            Ok(context) => context,
            Err(CardServiceError::NoReadersAvailable) => return CycleOutcome::NoReader,
            Err(e) => return CycleOutcome::Failed(e),
        };

        let readers = match context.list_readers() {
            Ok(readers) => readers,
            Err(CardServiceError::NoReadersAvailable) => return CycleOutcome::NoReader,
            Err(e) => return CycleOutcome::Failed(e),
        };
        let Some(reader) = select_reader(&readers, &self.config.preferred_reader) else {
            return CycleOutcome::NoReader;
        };

        let attempts = self.config.connect_retries.max(1);
        let mut session = None;
        let mut last = CardServiceError::NoSmartcard;

        for attempt in 1..=attempts {
            if self.stop.is_stopped() {
                return CycleOutcome::Cancelled;
            }

            let wait = match context.connect(reader) {
                Ok(connected) => {
                    session = Some(connected);
                    break;
                }
                Err(CardServiceError::SharingViolation) => {
                    debug!(reader, attempt, "Reader busy, retrying");
                    last = CardServiceError::SharingViolation;
                    self.config.busy_retry_delay()
                }
                Err(CardServiceError::NoSmartcard) => {
                    last = CardServiceError::NoSmartcard;
                    self.config.poll_interval()
                }
                Err(e) => return CycleOutcome::Failed(e),
            };

            if !self.stop.sleep(wait) {
                return CycleOutcome::Cancelled;
            }
        }

        let Some(mut session) = session else {
            return CycleOutcome::RetriesExhausted { attempts, last };
        };

        let response = match session.transmit(&GET_UID_APDU) {
            Ok(response) => response,
            Err(e) => return CycleOutcome::Failed(e),
        };

        match UidResponse::parse(&response) {
            UidResponse::Uid(bytes) => CycleOutcome::Uid(hex::encode_dashed(&bytes)),
            UidResponse::Empty => CycleOutcome::NoCard,
            UidResponse::Status(status) => CycleOutcome::StatusNotSuccess(status),
            UidResponse::Malformed => {
                CycleOutcome::Failed(CardServiceError::Other("short UID response".to_string()))
            }
        }
    }
}

impl fmt::Debug for CardPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardPoller")
            .field("config", &self.config)
            .finish()
    }
}

/// Polls a PC/SC contactless reader on a background thread and emits
/// `UidFound` for every UID read.
pub struct ContactlessDriver {
    name: String,
    config: ContactlessConfig,
    service: Arc<dyn CardService>,
    subscribers: Subscribers<DeviceEvent>,
    state: Arc<StateTracker>,
    stop: StopSignal,
    worker: Option<JoinHandle<()>>,
}

impl ContactlessDriver {
    pub fn new(
        name: impl Into<String>,
        config: ContactlessConfig,
        service: Arc<dyn CardService>,
    ) -> Self {
        let name = name.into();
        let subscribers = Subscribers::new();
        Self {
            state: Arc::new(StateTracker::new(name.clone(), subscribers.clone())),
            subscribers,
            name,
            config,
            service,
            stop: StopSignal::new(),
            worker: None,
        }
    }

    pub fn config(&self) -> &ContactlessConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    fn spawn_worker(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(HardwareError::already_running(&self.name));
        }

        self.stop = StopSignal::new();
        let poller = CardPoller::new(
            Arc::clone(&self.service),
            self.config.clone(),
            self.stop.clone(),
        );
        let device = self.name.clone();
        let subscribers = self.subscribers.clone();
        let state = Arc::clone(&self.state);
        let stop = self.stop.clone();

        let handle = thread::Builder::new()
            .name(format!("pcsc-{}", self.name))
            .spawn(move || poll_loop(&device, &poller, &subscribers, &state, &stop))
            .map_err(|e| HardwareError::start_failed(&self.name, format!("driver thread: {e}")))?;

        self.worker = Some(handle);
        Ok(())
    }

    fn halt(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.worker.take() {
            join_bounded(handle, &self.name);
        }
        self.state.set(ConnectionState::Disconnected);
    }
}

fn poll_loop(
    device: &str,
    poller: &CardPoller,
    subscribers: &Subscribers<DeviceEvent>,
    state: &StateTracker,
    stop: &StopSignal,
) {
    info!(device, reader = %poller.config.preferred_reader, "Contactless polling started");
    state.set(ConnectionState::Connecting);

    while !stop.is_stopped() {
        match poller.poll_once() {
            CycleOutcome::Uid(uid) => {
                state.set(ConnectionState::Open);
                info!(device, uid = %uid, "Card UID read");
                subscribers.emit(&DeviceEvent::UidFound {
                    device: device.to_string(),
                    uid,
                });
            }
            CycleOutcome::NoReader => {
                if state.get() != ConnectionState::Reconnecting {
                    warn!(device, "No contactless reader found");
                }
                state.set(ConnectionState::Reconnecting);
            }
            CycleOutcome::Failed(error) => {
                debug!(device, error = %error, "Polling cycle failed");
            }
            CycleOutcome::Cancelled => break,
            outcome => {
                state.set(ConnectionState::Open);
                debug!(device, ?outcome, "No UID this cycle");
            }
        }

        if !stop.sleep(poller.config.poll_interval()) {
            break;
        }
    }

    info!(device, "Contactless polling stopped");
}

impl ReaderDevice for ContactlessDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ReaderKind {
        ReaderKind::Contactless
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn events(&self) -> &Subscribers<DeviceEvent> {
        &self.subscribers
    }

    fn start(&mut self) -> Result<()> {
        self.spawn_worker()
    }

    fn stop(&mut self) {
        self.halt();
    }
}

impl Drop for ContactlessDriver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.halt();
        }
    }
}

impl fmt::Debug for ContactlessDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactlessDriver")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CardScript, MockCardService};

    fn fast_config(retries: u32) -> ContactlessConfig {
        ContactlessConfig {
            poll_interval_ms: 5,
            busy_retry_delay_ms: 5,
            connect_retries: retries,
            ..ContactlessConfig::default()
        }
    }

    fn poller(service: &MockCardService, retries: u32) -> CardPoller {
        CardPoller::new(
            Arc::new(service.clone()),
            fast_config(retries),
            StopSignal::new(),
        )
    }

    #[test]
    fn test_uid_read_and_handles_released() {
        let (service, handle) = MockCardService::new(vec!["ACS ACR1281 PICC 0".into()]);
        handle.script(CardScript::Card(vec![0x04, 0xAB, 0x12, 0xCD]));

        assert_eq!(
            poller(&service, 3).poll_once(),
            CycleOutcome::Uid("04-AB-12-CD".into())
        );
        assert_eq!(handle.open_contexts(), 0);
        assert_eq!(handle.open_sessions(), 0);
        assert_eq!(handle.transmitted(), vec![GET_UID_APDU.to_vec()]);
    }

    #[test]
    fn test_sharing_violation_retried_then_exhausted() {
        let (service, handle) = MockCardService::new(vec!["PICC".into()]);
        handle.script(CardScript::Busy);

        let outcome = poller(&service, 4).poll_once();

        assert_eq!(
            outcome,
            CycleOutcome::RetriesExhausted {
                attempts: 4,
                last: CardServiceError::SharingViolation
            }
        );
        assert_eq!(handle.connect_attempts(), 4);
        assert!(handle.transmitted().is_empty());
        assert_eq!(handle.open_contexts(), 0);
    }

    #[test]
    fn test_busy_then_card_succeeds() {
        let (service, handle) = MockCardService::new(vec!["PICC".into()]);
        handle.script(CardScript::BusyThenCard {
            busy_attempts: 2,
            uid: vec![0x01, 0x02],
        });

        assert_eq!(
            poller(&service, 10).poll_once(),
            CycleOutcome::Uid("01-02".into())
        );
        assert_eq!(handle.connect_attempts(), 3);
    }

    #[test]
    fn test_no_card_exhausts_retries() {
        let (service, handle) = MockCardService::new(vec!["PICC".into()]);
        handle.script(CardScript::NoCard);

        assert!(matches!(
            poller(&service, 2).poll_once(),
            CycleOutcome::RetriesExhausted {
                last: CardServiceError::NoSmartcard,
                ..
            }
        ));
    }

    #[test]
    fn test_non_success_status_is_not_an_error() {
        let (service, handle) = MockCardService::new(vec!["PICC".into()]);
        handle.script(CardScript::Status(0x6A, 0x81));

        assert_eq!(
            poller(&service, 1).poll_once(),
            CycleOutcome::StatusNotSuccess(StatusWord {
                sw1: 0x6A,
                sw2: 0x81
            })
        );
        assert_eq!(handle.open_sessions(), 0);
    }

    #[test]
    fn test_no_reader() {
        let (service, _handle) = MockCardService::new(vec![]);
        assert_eq!(poller(&service, 1).poll_once(), CycleOutcome::NoReader);
    }

    #[test]
    fn test_fatal_connect_error_aborts_cycle() {
        let (service, handle) = MockCardService::new(vec!["PICC".into()]);
        handle.script(CardScript::ConnectError("reader removed".into()));

        assert!(matches!(
            poller(&service, 5).poll_once(),
            CycleOutcome::Failed(CardServiceError::Other(_))
        ));
        assert_eq!(handle.connect_attempts(), 1);
    }

    #[test]
    fn test_stop_cancels_cycle() {
        let (service, handle) = MockCardService::new(vec!["PICC".into()]);
        handle.script(CardScript::Busy);

        let stop = StopSignal::new();
        stop.stop();
        let poller = CardPoller::new(Arc::new(service), fast_config(10), stop);

        assert_eq!(poller.poll_once(), CycleOutcome::Cancelled);
    }

    #[test]
    fn test_select_reader_prefers_substring() {
        let readers = vec!["Generic SAM".to_string(), "Dual PICC".to_string()];
        assert_eq!(select_reader(&readers, "picc"), Some("Dual PICC"));
        assert_eq!(select_reader(&readers, ""), Some("Generic SAM"));
    }
}
