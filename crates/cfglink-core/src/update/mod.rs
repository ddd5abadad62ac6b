//! Firmware update staging and slot activation.
//!
//! The engine drives a sequential-write update: resolve the next slot,
//! `begin`, stream `write` calls, then either `abort` or `end` + `set_boot`.
//! At most one update is in flight per backend.

pub mod mock;
pub mod slots;

pub use mock::MockUpdater;
pub use slots::FileSlots;

use thiserror::Error;

use crate::protocol::packet::ErrorCode;

/// Update slot identifier.
pub type SlotId = u8;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("No update slot available")]
    NoSlot,
    #[error("An update is already in progress")]
    AlreadyActive,
    #[error("No update in progress")]
    NotActive,
    #[error("Update backend error: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// The NACK / `CHUNK_ACK` aux code a failed update operation maps to.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            UpdateError::NoSlot => ErrorCode::NotSupported,
            UpdateError::AlreadyActive | UpdateError::NotActive => ErrorCode::InvalidState,
            UpdateError::Backend(_) | UpdateError::Io(_) => ErrorCode::Io,
        }
    }
}

/// Firmware update backend.
pub trait FirmwareUpdate: Send {
    /// The slot the next image should be staged into, if any.
    fn next_slot(&self) -> Option<SlotId>;

    /// Open `slot` for sequential writing.
    fn begin(&mut self, slot: SlotId) -> Result<(), UpdateError>;

    /// Append image bytes to the open slot.
    fn write(&mut self, data: &[u8]) -> Result<(), UpdateError>;

    /// Discard the staged image and close the slot.
    fn abort(&mut self) -> Result<(), UpdateError>;

    /// Finalise the staged image.
    fn end(&mut self) -> Result<(), UpdateError>;

    /// Mark `slot` as the boot image for the next restart.
    fn set_boot(&mut self, slot: SlotId) -> Result<(), UpdateError>;
}
