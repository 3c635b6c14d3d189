//! Core types for the library terminal identification pipeline.
//!
//! This crate holds everything that is pure data or pure computation:
//! identifier types shared by drivers and the event gate, the EPC-96 tag
//! decoder, hex helpers, identifier normalization rules and the serial
//! port selector grammar. Nothing here touches hardware or spawns threads.

pub mod constants;
pub mod epc;
pub mod error;
pub mod hex;
pub mod identifier;
pub mod port;
pub mod types;

pub use epc::EpcRecord;
pub use error::{Error, Result};
pub use identifier::NormalizationRules;
pub use port::{PortDescriptor, PortSelector};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
