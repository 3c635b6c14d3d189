//! The event gate.
//!
//! Every identifier a reader reports passes through [`EventGate::submit`]
//! before anything acts on it. The gate owns one slot per
//! [`GateChannel`] and decides, under that slot's lock, whether the
//! identifier starts a business action:
//!
//! ```text
//!  payload ──normalize──► key ──┐
//!                               ▼
//!                    ┌─────────────────────┐
//!                    │ slot (one per chan) │  busy?           ──► Dropped(Busy)
//!                    │  last_key           │  same key within
//!                    │  last_accepted_at   │  debounce window? ──► Dropped(Debounced)
//!                    │  busy               │
//!                    └──────────┬──────────┘
//!                               │ busy = true
//!                               ▼
//!                     spawn action(key) ──► ActionTicket
//!                               │
//!                               └── on completion, panic or cancel: busy = false
//! ```
//!
//! Only the submitting call takes the slot lock, and never across an await.
//! Channels do not share locks, so a slow return never holds up a card.

use crate::error::{GateError, OperationError, Result};
use crate::operations::Completed;
use futures::future::BoxFuture;
use libterm_core::constants::{DEFAULT_BOOK_DEBOUNCE_MS, DEFAULT_CARD_DEBOUNCE_MS, EPC_HEX_LEN};
use libterm_core::{GateChannel, NormalizationRules, NormalizedIdentifier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What a channel action resolves to.
pub type ActionResult = std::result::Result<Completed, OperationError>;

/// A registered channel action.
pub type GateAction =
    Arc<dyn Fn(NormalizedIdentifier) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// Debounce windows and normalization rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub take_debounce_ms: u64,
    pub return_debounce_ms: u64,
    pub card_debounce_ms: u64,
    pub rules: NormalizationRules,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            take_debounce_ms: DEFAULT_BOOK_DEBOUNCE_MS,
            return_debounce_ms: DEFAULT_BOOK_DEBOUNCE_MS,
            card_debounce_ms: DEFAULT_CARD_DEBOUNCE_MS,
            rules: NormalizationRules::default(),
        }
    }
}

impl GateConfig {
    /// Debounce window of `channel`.
    #[must_use]
    pub fn debounce(&self, channel: GateChannel) -> Duration {
        Duration::from_millis(match channel {
            GateChannel::BookTake => self.take_debounce_ms,
            GateChannel::BookReturn => self.return_debounce_ms,
            GateChannel::Card => self.card_debounce_ms,
        })
    }
}

/// Why a submitted identifier was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// An action is already running on the channel.
    Busy,

    /// The same key was accepted within the debounce window.
    Debounced,

    /// Nothing usable was left after normalization.
    Unrecognized,

    /// No action is registered for the channel.
    Unregistered,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "busy"),
            Self::Debounced => write!(f, "debounced"),
            Self::Unrecognized => write!(f, "unrecognized"),
            Self::Unregistered => write!(f, "unregistered"),
        }
    }
}

/// Result of [`EventGate::submit`].
#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(ActionTicket),
    Dropped(DropReason),
}

impl SubmitOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    #[must_use]
    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Self::Dropped(reason) => Some(*reason),
            Self::Accepted(_) => None,
        }
    }

    #[must_use]
    pub fn into_ticket(self) -> Option<ActionTicket> {
        match self {
            Self::Accepted(ticket) => Some(ticket),
            Self::Dropped(_) => None,
        }
    }
}

/// Handle on an accepted action.
///
/// The action runs whether or not the ticket is awaited; dropping the
/// ticket detaches it.
#[derive(Debug)]
pub struct ActionTicket {
    channel: GateChannel,
    key: NormalizedIdentifier,
    task: JoinHandle<ActionResult>,
}

impl ActionTicket {
    pub fn channel(&self) -> GateChannel {
        self.channel
    }

    /// The normalized key the action was started with.
    pub fn key(&self) -> &NormalizedIdentifier {
        &self.key
    }

    /// Wait for the action to finish.
    pub async fn wait(self) -> Result<Completed> {
        match self.task.await {
            Ok(result) => result.map_err(GateError::from),
            Err(e) if e.is_panic() => Err(GateError::ActionPanicked {
                channel: self.channel,
            }),
            Err(_) => Err(GateError::ActionCancelled {
                channel: self.channel,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    last_key: Option<NormalizedIdentifier>,
    last_accepted_at: Option<Instant>,
    busy: bool,
}

type SharedSlot = Arc<Mutex<SlotState>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, SlotState> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the channel when the action ends, however it ends.
struct BusyGuard {
    channel: GateChannel,
    slot: SharedSlot,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        lock(&self.slot).busy = false;
        debug!(channel = %self.channel, "Channel released");
    }
}

struct Slot {
    window: Duration,
    state: SharedSlot,
    action: Option<GateAction>,
}

/// Normalizes identifiers and runs at most one action per channel.
pub struct EventGate {
    rules: NormalizationRules,
    runtime: Handle,
    slots: HashMap<GateChannel, Slot>,
}

impl fmt::Debug for EventGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<_> = GateChannel::ALL
            .into_iter()
            .filter(|c| self.slots.get(c).is_some_and(|s| s.action.is_some()))
            .collect();
        f.debug_struct("EventGate")
            .field("rules", &self.rules)
            .field("registered", &registered)
            .finish()
    }
}

impl EventGate {
    /// Create a gate whose actions are spawned on `runtime`.
    pub fn new(config: GateConfig, runtime: Handle) -> Self {
        let slots = GateChannel::ALL
            .into_iter()
            .map(|channel| {
                (
                    channel,
                    Slot {
                        window: config.debounce(channel),
                        state: SharedSlot::default(),
                        action: None,
                    },
                )
            })
            .collect();

        Self {
            rules: config.rules,
            runtime,
            slots,
        }
    }

    /// Register the action run for identifiers accepted on `channel`.
    ///
    /// Replaces any earlier registration.
    pub fn register<F, Fut>(&mut self, channel: GateChannel, action: F)
    where
        F: Fn(NormalizedIdentifier) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let action: GateAction = Arc::new(move |key| Box::pin(action(key)));
        if let Some(slot) = self.slots.get_mut(&channel) {
            slot.action = Some(action);
        }
    }

    /// The key `raw` resolves to on `channel`.
    ///
    /// Book channels key by the tag ([`NormalizationRules::book_key`]).
    /// The card channel normalizes the UID; a payload of EPC length or
    /// more is a UHF tag standing in for a card and is cut to the
    /// configured card UID length.
    pub fn normalize(&self, channel: GateChannel, raw: &str) -> Option<NormalizedIdentifier> {
        if channel.is_book() {
            return self.rules.book_key(raw);
        }

        let key = self.rules.normalize(raw)?;
        let is_epc = key.as_str().len() >= EPC_HEX_LEN
            && key.as_str().bytes().all(|b| b.is_ascii_hexdigit());
        if is_epc {
            self.rules.card_uid_from_epc(key.as_str())
        } else {
            Some(key)
        }
    }

    /// Whether an action is running on `channel`.
    pub fn is_busy(&self, channel: GateChannel) -> bool {
        self.slots
            .get(&channel)
            .is_some_and(|slot| lock(&slot.state).busy)
    }

    /// Submit a payload received now.
    pub fn submit(&self, channel: GateChannel, raw: &str) -> SubmitOutcome {
        self.submit_at(channel, raw, Instant::now())
    }

    /// Submit a payload received at `now`.
    pub fn submit_at(&self, channel: GateChannel, raw: &str, now: Instant) -> SubmitOutcome {
        let Some(key) = self.normalize(channel, raw) else {
            debug!(%channel, payload = raw, "Dropped: nothing left after normalization");
            return SubmitOutcome::Dropped(DropReason::Unrecognized);
        };

        let Some(slot) = self.slots.get(&channel) else {
            return SubmitOutcome::Dropped(DropReason::Unregistered);
        };
        let Some(action) = slot.action.clone() else {
            debug!(%channel, %key, "Dropped: no action registered");
            return SubmitOutcome::Dropped(DropReason::Unregistered);
        };

        let guard = {
            let mut state = lock(&slot.state);

            if state.busy {
                debug!(%channel, %key, "Dropped: action in flight");
                return SubmitOutcome::Dropped(DropReason::Busy);
            }

            let repeated = state.last_key.as_ref() == Some(&key);
            let recent = state
                .last_accepted_at
                .is_some_and(|at| now.saturating_duration_since(at) < slot.window);
            if repeated && recent {
                debug!(%channel, %key, "Dropped: within debounce window");
                return SubmitOutcome::Dropped(DropReason::Debounced);
            }

            state.busy = true;
            state.last_key = Some(key.clone());
            state.last_accepted_at = Some(now);
            BusyGuard {
                channel,
                slot: Arc::clone(&slot.state),
            }
        };

        info!(%channel, %key, "Accepted");
        let task_key = key.clone();
        let task = self.runtime.spawn(async move {
            let _guard = guard;
            let result = action(task_key.clone()).await;
            match &result {
                Ok(done) => info!(%channel, key = %task_key, outcome = %done, "Action completed"),
                Err(e) => warn!(%channel, key = %task_key, error = %e, "Action failed"),
            }
            result
        });

        SubmitOutcome::Accepted(ActionTicket { channel, key, task })
    }
}
