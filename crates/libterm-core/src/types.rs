use crate::constants::{EPC_KIND_BOOK, EPC_KIND_CARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a decoded EPC tag is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Book,
    Card,
    Unknown,
}

impl TagKind {
    /// Map the 4-bit kind field of an EPC to a tag kind.
    #[inline]
    #[must_use]
    pub fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            EPC_KIND_BOOK => Self::Book,
            EPC_KIND_CARD => Self::Card,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Book => write!(f, "Book"),
            Self::Card => write!(f, "Card"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The role a physical reader plays in the kiosk.
///
/// A reader is registered with a role; every identifier it reports is
/// tagged with that role regardless of the reader technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    Book,
    Card,
}

impl fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Book => write!(f, "book"),
            Self::Card => write!(f, "card"),
        }
    }
}

/// Logical channel guarded by its own debounce and single-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateChannel {
    BookTake,
    BookReturn,
    Card,
}

impl GateChannel {
    /// All channels, in a stable order.
    pub const ALL: [GateChannel; 3] = [Self::BookTake, Self::BookReturn, Self::Card];

    /// Whether payloads on this channel are book tags.
    #[inline]
    #[must_use]
    pub fn is_book(self) -> bool {
        matches!(self, Self::BookTake | Self::BookReturn)
    }
}

impl fmt::Display for GateChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BookTake => write!(f, "book-take"),
            Self::BookReturn => write!(f, "book-return"),
            Self::Card => write!(f, "card"),
        }
    }
}

/// An identifier as reported by a driver, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawEvent {
    /// Role of the reader that produced the event.
    pub channel: SourceChannel,

    /// Name of the reader that produced the event.
    pub source: String,

    /// Line text or hex payload exactly as the driver emitted it.
    pub payload: String,

    /// When the driver emitted the event.
    pub timestamp: DateTime<Utc>,
}

impl RawEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        channel: SourceChannel,
        source: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            source: source.into(),
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A normalized identifier key.
///
/// Produced only by [`NormalizationRules`](crate::NormalizationRules);
/// equality of two keys is what the debounce logic compares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedIdentifier(String);

impl NormalizedIdentifier {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the owned string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
