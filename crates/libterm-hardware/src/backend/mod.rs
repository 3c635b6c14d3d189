//! Real hardware backends.
//!
//! Each backend binds one seam from [`crate::traits`] to a system API and
//! is compiled only with its feature:
//!
//! | Feature           | Backend                                   |
//! |-------------------|-------------------------------------------|
//! | `hardware-serial` | [`serial`]: line transport, port listing  |
//! | `hardware-pcsc`   | [`pcsc`]: PC/SC card service              |
//!
//! The vendor UHF library has no backend here; integrators bind it by
//! implementing [`UhfVendorApi`](crate::traits::UhfVendorApi).

#[cfg(feature = "hardware-pcsc")]
pub mod pcsc;

#[cfg(feature = "hardware-serial")]
pub mod serial;
