//! Mock hardware for testing and development.
//!
//! Every seam in [`crate::traits`] has a scripted implementation here.
//! Each mock comes paired with a handle that drives it from the test
//! side (pushing input, injecting faults) and records what the driver did.

pub mod actuator;
pub mod card;
pub mod line;
pub mod ports;
pub mod uhf;

pub use actuator::RecordingActuator;
pub use card::{CardScript, MockCardHandle, MockCardService};
pub use line::{MockLineHandle, MockLineTransport};
pub use ports::MockSerialPorts;
pub use uhf::{MockUhfHandle, MockUhfVendor, VendorCall};
