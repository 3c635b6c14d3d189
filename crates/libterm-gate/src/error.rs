//! Error types for the event gate and the book workflow.
//!
//! Three layers, innermost first:
//!
//! - [`CatalogError`]: the catalog service could not answer.
//! - [`OperationError`]: a take, return or card check was refused. This is
//!   what the kiosk shows the patron.
//! - [`GateError`]: what waiting on an accepted action yields; wraps the
//!   operation error or reports that the action never completed.

use libterm_core::GateChannel;

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Failures reported by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// The service could not be reached.
    #[error("Catalog unavailable: {message}")]
    Unavailable { message: String },

    /// The service refused the request.
    #[error("Catalog rejected the request: {message}")]
    Rejected { message: String },
}

impl CatalogError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Why a card check, take or return did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The catalog does not know the card.
    #[error("Card not recognized: {uid}")]
    CardRejected { uid: String },

    /// A take was attempted before a card was accepted.
    #[error("No patron card has been accepted")]
    NoPatron,

    /// No record carries the scanned tag.
    #[error("No book found for tag {key}")]
    BookNotFound { key: String },

    /// A record was found but none of its copies carries the tag.
    #[error("Tag {key} does not match any copy of record {record_id}")]
    CopyNotMatched { key: String, record_id: u32 },

    /// The copy is not in stock.
    #[error("Book {key} is already issued (status {status})")]
    AlreadyIssued { key: String, status: String },

    /// The return bin is full.
    #[error("Return bin has no space")]
    NoSpace,

    /// The catalog answered with an empty description.
    #[error("Catalog did not record the {operation}")]
    NotRecorded { operation: &'static str },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The cabinet actuator call could not be run.
    #[error("Actuator error: {message}")]
    Actuator { message: String },
}

impl OperationError {
    pub fn book_not_found(key: impl Into<String>) -> Self {
        Self::BookNotFound { key: key.into() }
    }

    pub fn actuator(message: impl Into<String>) -> Self {
        Self::Actuator {
            message: message.into(),
        }
    }
}

/// Errors returned when waiting on an accepted action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// The action panicked. The channel has been released.
    #[error("Action on channel {channel} panicked")]
    ActionPanicked { channel: GateChannel },

    /// The runtime dropped the action before it finished.
    #[error("Action on channel {channel} was cancelled")]
    ActionCancelled { channel: GateChannel },
}

impl GateError {
    /// The operation error, if the action ran to completion.
    pub fn as_operation(&self) -> Option<&OperationError> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_converts() {
        let err: OperationError = CatalogError::unavailable("timeout").into();
        assert_eq!(err.to_string(), "Catalog unavailable: timeout");
    }

    #[test]
    fn test_gate_error_exposes_operation() {
        let err: GateError = OperationError::NoSpace.into();
        assert_eq!(err.as_operation(), Some(&OperationError::NoSpace));

        let panicked = GateError::ActionPanicked {
            channel: GateChannel::Card,
        };
        assert!(panicked.as_operation().is_none());
        assert_eq!(panicked.to_string(), "Action on channel card panicked");
    }
}
