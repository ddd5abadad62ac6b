//! Transport layer module.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::MockWire;
pub use serial::SerialWire;
pub use traits::{TransportError, WireTransport};
