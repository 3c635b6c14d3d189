//! Reader drivers for the library terminal.
//!
//! This crate turns three kinds of identification hardware into one
//! stream of identifiers:
//!
//! - **Serial line readers** ([`line`], [`protocols`]): card and book
//!   readers that print one identifier per text line. A reconnecting
//!   [`LineDriver`] keeps the port open across unplugs and faults.
//! - **Contactless readers** ([`contactless`]): PC/SC readers polled for
//!   the card UID with the `FF CA 00 00 00` pseudo-APDU.
//! - **Vendor UHF readers** ([`uhf`]): book tags read in active mode after
//!   an exhaustive port × baud × address search.
//!
//! The cabinet controller that opens the return bin lives in
//! [`actuator`].
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────┐ ┌──────────────────┐ ┌───────────┐
//!  │ LineDriver │ │ContactlessDriver │ │ UhfDriver │   one thread each
//!  └─────┬──────┘ └────────┬─────────┘ └─────┬─────┘
//!        │ DeviceEvent     │                 │
//!        └─────────────────┼─────────────────┘
//!                          ▼
//!                   ┌─────────────┐  RawEvent (role-tagged)
//!                   │ReaderManager│──────────────────────────► event gate
//!                   └─────────────┘  tokio mpsc
//! ```
//!
//! Drivers block on their hardware on dedicated threads and publish
//! [`DeviceEvent`]s to their [`Subscribers`]. The [`ReaderManager`]
//! bridges those callbacks into an async channel.
//!
//! # Hardware seams
//!
//! Drivers never touch a system API directly; they go through the traits
//! in [`traits`]. The [`mock`] module implements every seam for tests,
//! and [`backend`] binds them to real hardware behind the
//! `hardware-serial` and `hardware-pcsc` features.
//!
//! # Error Handling
//!
//! Operations return [`Result<T>`][error::Result] with [`HardwareError`].
//! Runtime I/O faults inside a driver loop are not errors to the caller:
//! they are logged and retried, and surface only as state changes.

pub mod actuator;
pub mod backend;
pub mod cancel;
pub mod contactless;
pub mod detect;
pub mod devices;
pub mod error;
pub mod events;
pub mod line;
pub mod manager;
pub mod mock;
pub mod protocols;
pub mod traits;
pub mod types;
pub mod uhf;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use events::{SubscriptionId, Subscribers};
pub use types::{ConnectionState, Detection, DeviceEvent, LineConfig, PortPolicy, ReaderKind};

// Re-export drivers
pub use actuator::{ActuatorConfig, NullActuator, SerialActuator};
pub use contactless::{ContactlessConfig, ContactlessDriver, CycleOutcome};
pub use detect::{DetectedDevice, detect_line_device, resolve_detected};
pub use devices::AnyReader;
pub use line::{LineDriver, LineHooks, LineLink};
pub use protocols::{SerialReader, SerialReaderConfig};
pub use uhf::{UhfConfig, UhfDriver};

// Re-export manager types
pub use manager::{ManagerConfig, ReaderHandle, ReaderManager, ReaderStatus, StartupFailure};
