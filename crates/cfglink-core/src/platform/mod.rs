//! Platform services: clock and device identity.

pub mod clock;
pub mod identity;

pub use clock::{Clock, FixedClock, SystemClock, reset_reason};
pub use identity::{DeviceIdentity, IdentityInfo, StaticIdentity, UnavailableIdentity};

use thiserror::Error;

use crate::protocol::packet::ErrorCode;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Identity source unavailable: {0}")]
    Unavailable(String),
}

impl PlatformError {
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            PlatformError::Unavailable(_) => ErrorCode::Io,
        }
    }
}
