//! Event gate and book workflow for the library terminal.
//!
//! Readers report identifiers on their own threads with no coordination.
//! This crate is the single place where those reports meet:
//!
//! ```text
//!  ReaderHandle ──RawEvent──► EventRouter ──GateChannel──► EventGate ──► BookOperations
//!                             (kiosk mode)                 (debounce,     (catalog,
//!                                                           single-flight) cabinet)
//! ```
//!
//! - [`router`] decides which channel a reader event belongs to.
//! - [`gate`] normalizes the identifier and starts at most one action per
//!   channel, dropping repeats inside the debounce window.
//! - [`operations`] runs card checks, takes and returns against a
//!   [`catalog::CatalogService`] and a cabinet actuator.
//!
//! # Error Handling
//!
//! Refusals are [`OperationError`]s returned from the action and surfaced
//! through [`gate::ActionTicket::wait`] as [`GateError`]. Dropped
//! identifiers are not errors; they are reported as
//! [`gate::DropReason`]s.

pub mod catalog;
pub mod error;
pub mod gate;
pub mod mock;
pub mod operations;
pub mod router;

pub use catalog::{BookRecord, CatalogService, CopyRecord};
pub use error::{CatalogError, GateError, OperationError, Result};
pub use gate::{ActionTicket, DropReason, EventGate, GateConfig, SubmitOutcome};
pub use operations::{BookOperations, BookReceipt, Completed, OperationsConfig};
pub use router::{DispatchStats, EventRouter, KioskMode, dispatch_events};
