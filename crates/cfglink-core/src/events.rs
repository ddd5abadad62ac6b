//! Event system for front-end decoupling.
//!
//! Allows a CLI or other supervisor to observe protocol activity without
//! tight coupling to the engine.

use crate::protocol::packet::Opcode;

/// Events emitted by the engine and session.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A validated request packet was accepted for dispatch.
    PacketReceived { opcode: Opcode, payload_len: usize },
    /// A reply packet was written and flushed.
    ReplySent { opcode: Opcode, payload_len: usize },
    /// A frame failed its CRC check and was NACKed.
    CrcMismatch { expected: u16, actual: u16 },
    /// A frame carried an opcode this engine does not know.
    UnknownOpcode { raw: u8 },
    /// A streamed file write began.
    FileWriteStarted { path: String, expected: u64 },
    /// A file chunk was appended.
    FileWriteProgress { written: u64, expected: u64 },
    /// A streamed file write completed.
    FileWriteFinished { path: String, written: u64 },
    /// The host aborted a streamed file write.
    FileWriteAborted { path: String },
    /// A firmware update transaction began.
    OtaStarted { slot: u8 },
    /// A firmware chunk was staged.
    OtaProgress { offset: u32 },
    /// The host aborted the firmware update.
    OtaAborted,
    /// The staged firmware image was activated.
    OtaCommitted { slot: u8 },
    /// A reboot was requested; the session will act after the ACK drains.
    RebootRequested { bootloader: bool },
}

/// Observer trait for receiving agent events.
///
/// Implement this in the front-end to receive updates.
pub trait AgentObserver: Send + Sync {
    fn on_event(&self, event: &AgentEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl AgentObserver for NullObserver {
    fn on_event(&self, _event: &AgentEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl AgentObserver for TracingObserver {
    fn on_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::PacketReceived { opcode, payload_len } => {
                tracing::debug!(opcode = %opcode, len = payload_len, "Packet received");
            }
            AgentEvent::ReplySent { opcode, payload_len } => {
                tracing::debug!(opcode = %opcode, len = payload_len, "Reply sent");
            }
            AgentEvent::CrcMismatch { expected, actual } => {
                tracing::warn!(
                    expected = format!("{expected:#06x}"),
                    actual = format!("{actual:#06x}"),
                    "Packet CRC mismatch"
                );
            }
            AgentEvent::UnknownOpcode { raw } => {
                tracing::warn!(opcode = format!("{raw:#04x}"), "Unknown opcode");
            }
            AgentEvent::FileWriteStarted { path, expected } => {
                tracing::info!(path = %path, expected, "File write started");
            }
            AgentEvent::FileWriteProgress { written, expected } => {
                tracing::debug!(written, expected, "File write progress");
            }
            AgentEvent::FileWriteFinished { path, written } => {
                tracing::info!(path = %path, written, "File write finished");
            }
            AgentEvent::FileWriteAborted { path } => {
                tracing::warn!(path = %path, "File write aborted by host");
            }
            AgentEvent::OtaStarted { slot } => {
                tracing::info!(slot, "Firmware update started");
            }
            AgentEvent::OtaProgress { offset } => {
                tracing::debug!(offset, "Firmware update progress");
            }
            AgentEvent::OtaAborted => {
                tracing::warn!("Firmware update aborted by host");
            }
            AgentEvent::OtaCommitted { slot } => {
                tracing::info!(slot, "Firmware update committed");
            }
            AgentEvent::RebootRequested { bootloader } => {
                tracing::warn!(bootloader, "Reboot requested");
            }
        }
    }
}
