//! Mock PC/SC card service.

use crate::traits::{CardContext, CardService, CardServiceError, CardSession};
use libterm_core::constants::SW_SUCCESS;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What the card in the field does on the next connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardScript {
    /// No card present.
    NoCard,

    /// A card answering with this UID.
    Card(Vec<u8>),

    /// Every connect hits a sharing violation.
    Busy,

    /// `busy_attempts` sharing violations, then a card.
    BusyThenCard { busy_attempts: usize, uid: Vec<u8> },

    /// A card answering the UID request with this status word.
    Status(u8, u8),

    /// Connects fail with a non-retryable error.
    ConnectError(String),
}

#[derive(Debug)]
struct CardState {
    readers: Vec<String>,
    script: CardScript,
    connect_attempts: usize,
    open_contexts: usize,
    open_sessions: usize,
    transmitted: Vec<Vec<u8>>,
}

type Shared = Arc<Mutex<CardState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, CardState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Card service with scripted readers and card behavior.
#[derive(Debug, Clone)]
pub struct MockCardService {
    shared: Shared,
}

/// Test-side control of a [`MockCardService`].
#[derive(Debug, Clone)]
pub struct MockCardHandle {
    shared: Shared,
}

impl MockCardService {
    /// A service listing `readers`, with no card in the field.
    pub fn new(readers: Vec<String>) -> (Self, MockCardHandle) {
        let shared = Arc::new(Mutex::new(CardState {
            readers,
            script: CardScript::NoCard,
            connect_attempts: 0,
            open_contexts: 0,
            open_sessions: 0,
            transmitted: Vec::new(),
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockCardHandle { shared },
        )
    }
}

impl CardService for MockCardService {
    fn establish(&self) -> Result<Box<dyn CardContext>, CardServiceError> {
        lock(&self.shared).open_contexts += 1;
        Ok(Box::new(MockContext {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockContext {
    shared: Shared,
}

impl CardContext for MockContext {
    fn list_readers(&self) -> Result<Vec<String>, CardServiceError> {
        Ok(lock(&self.shared).readers.clone())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardSession>, CardServiceError> {
        let mut state = lock(&self.shared);
        if !state.readers.iter().any(|r| r == reader) {
            return Err(CardServiceError::Other(format!("unknown reader {reader}")));
        }

        state.connect_attempts += 1;
        match &state.script {
            CardScript::NoCard => return Err(CardServiceError::NoSmartcard),
            CardScript::Busy => return Err(CardServiceError::SharingViolation),
            CardScript::BusyThenCard { busy_attempts, .. }
                if state.connect_attempts <= *busy_attempts =>
            {
                return Err(CardServiceError::SharingViolation);
            }
            CardScript::ConnectError(message) => {
                return Err(CardServiceError::Other(message.clone()));
            }
            _ => {}
        }

        state.open_sessions += 1;
        Ok(Box::new(MockSession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        lock(&self.shared).open_contexts -= 1;
    }
}

struct MockSession {
    shared: Shared,
}

impl CardSession for MockSession {
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardServiceError> {
        let mut state = lock(&self.shared);
        state.transmitted.push(apdu.to_vec());

        let response = match &state.script {
            CardScript::Card(uid) | CardScript::BusyThenCard { uid, .. } => {
                let mut response = uid.clone();
                response.extend_from_slice(&SW_SUCCESS);
                response
            }
            CardScript::Status(sw1, sw2) => vec![*sw1, *sw2],
            _ => SW_SUCCESS.to_vec(),
        };
        Ok(response)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        lock(&self.shared).open_sessions -= 1;
    }
}

impl MockCardHandle {
    /// Replace the card behavior and reset the connect counter.
    pub fn script(&self, script: CardScript) {
        let mut state = lock(&self.shared);
        state.script = script;
        state.connect_attempts = 0;
    }

    pub fn set_readers(&self, readers: Vec<String>) {
        lock(&self.shared).readers = readers;
    }

    pub fn open_contexts(&self) -> usize {
        lock(&self.shared).open_contexts
    }

    pub fn open_sessions(&self) -> usize {
        lock(&self.shared).open_sessions
    }

    /// APDUs sent to cards, in order.
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).transmitted.clone()
    }

    /// Connect attempts since the last [`script`](Self::script) call.
    pub fn connect_attempts(&self) -> usize {
        lock(&self.shared).connect_attempts
    }
}
