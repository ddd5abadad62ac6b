//! Packet engine: receive-path validation, dispatch, reply construction.
//!
//! The engine is transport-decoupled: the session loop feeds it complete
//! frame bodies and writes out whatever replies it returns. Exactly one
//! reply is produced per accepted packet; frames too short to carry a
//! header are dropped without reply.

pub mod handlers;
pub mod machine;

pub use machine::{FileWriteState, OtaState};

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::events::{AgentEvent, AgentObserver};
use crate::platform::{Clock, DeviceIdentity};
use crate::protocol::constants::HEADER_SIZE;
use crate::protocol::crc::crc16_chained;
use crate::protocol::packet::{
    ChunkAckPacket, ChunkState, ErrorCode, NackPacket, Opcode, PacketHeader,
};
use crate::store::ConfigStore;
use crate::update::FirmwareUpdate;

/// A typed reply packet, not yet framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    pub fn ack() -> Self {
        Self::new(Opcode::Ack, Vec::new())
    }

    pub fn nack(code: ErrorCode) -> Self {
        Self::nack_raw(code.code())
    }

    pub fn nack_raw(err: i32) -> Self {
        Self::new(Opcode::Nack, NackPacket { err }.to_bytes())
    }

    pub fn chunk_ack(state: ChunkState, aux: u32) -> Self {
        Self::new(Opcode::ChunkAck, ChunkAckPacket { state, aux }.to_bytes())
    }

    /// Header and payload with the CRC stamped, ready for frame encoding.
    /// The CRC is computed over the header with its `crc` field zeroed,
    /// chained into the payload.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut header = PacketHeader::new(self.opcode, self.payload.len() as u16);
        header.crc = crc16_chained(&header.to_bytes(), &self.payload);
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Reboot flavour carried by [`Action::Reboot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootMode {
    Normal,
    /// Request forced download boot on the next start.
    Bootloader,
}

/// Side effect the session loop performs after sending the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Reboot(RebootMode),
}

/// Result of handling one frame.
#[derive(Debug)]
pub struct Outcome {
    pub reply: Option<Packet>,
    pub action: Action,
}

impl Outcome {
    pub fn reply(packet: Packet) -> Self {
        Self {
            reply: Some(packet),
            action: Action::None,
        }
    }

    pub fn silent() -> Self {
        Self {
            reply: None,
            action: Action::None,
        }
    }

    pub fn reboot(packet: Packet, mode: RebootMode) -> Self {
        Self {
            reply: Some(packet),
            action: Action::Reboot(mode),
        }
    }
}

/// The protocol engine: owns the transfer state machines and the device
/// subsystems, chosen at construction.
pub struct Engine<O: AgentObserver> {
    pub(crate) store: Box<dyn ConfigStore>,
    pub(crate) updater: Box<dyn FirmwareUpdate>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) identity: Box<dyn DeviceIdentity>,
    pub(crate) fs_root: PathBuf,
    pub(crate) observer: Arc<O>,
    pub(crate) file_xfer: FileWriteState,
    pub(crate) ota: OtaState,
}

impl<O: AgentObserver> Engine<O> {
    pub fn new(
        store: Box<dyn ConfigStore>,
        updater: Box<dyn FirmwareUpdate>,
        clock: Box<dyn Clock>,
        identity: Box<dyn DeviceIdentity>,
        fs_root: PathBuf,
        observer: Arc<O>,
    ) -> Self {
        Self {
            store,
            updater,
            clock,
            identity,
            fs_root,
            observer,
            file_xfer: FileWriteState::Idle,
            ota: OtaState::Idle,
        }
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        self.observer.on_event(&event);
    }

    /// Validate one decoded frame body and dispatch it.
    pub fn handle_frame(&mut self, body: &[u8]) -> Outcome {
        if body.len() < HEADER_SIZE {
            debug!(len = body.len(), "Frame too short for a header, dropping");
            return Outcome::silent();
        }
        let header = match PacketHeader::from_bytes(body) {
            Ok(h) => h,
            Err(_) => return Outcome::silent(),
        };
        let payload = &body[HEADER_SIZE..];

        if header.len as usize != payload.len() {
            warn!(
                declared = header.len,
                actual = payload.len(),
                "Packet length mismatch"
            );
            return Outcome::reply(Packet::nack(ErrorCode::InvalidSize));
        }

        let mut zeroed = header;
        zeroed.crc = 0;
        let actual = crc16_chained(&zeroed.to_bytes(), payload);
        if actual != header.crc {
            warn!(
                expected = format!("{:#06x}", header.crc),
                actual = format!("{actual:#06x}"),
                "Incoming packet CRC corrupted"
            );
            self.emit(AgentEvent::CrcMismatch {
                expected: header.crc,
                actual,
            });
            return Outcome::reply(Packet::nack(ErrorCode::Crc));
        }

        match Opcode::from_u8(header.opcode) {
            Some(opcode) => {
                self.emit(AgentEvent::PacketReceived {
                    opcode,
                    payload_len: payload.len(),
                });
                handlers::dispatch(self, opcode, payload)
            }
            None => {
                warn!(
                    opcode = format!("{:#04x}", header.opcode),
                    "Unknown packet type received"
                );
                self.emit(AgentEvent::UnknownOpcode { raw: header.opcode });
                Outcome::reply(Packet::nack(ErrorCode::UnknownOpcode))
            }
        }
    }

    /// Resolve a wire path to a location under the filesystem root. An
    /// absolute prefix is stripped; traversal components are rejected.
    pub(crate) fn resolve_path(&self, wire_path: &str) -> Result<PathBuf, ErrorCode> {
        let rel = wire_path.trim_start_matches('/');
        if rel.is_empty() {
            return Err(ErrorCode::InvalidArg);
        }
        let rel = Path::new(rel);
        if rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(ErrorCode::InvalidArg);
        }
        Ok(self.fs_root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::NackPacket;
    use crate::testkit::rig;

    fn nack_code(outcome: &Outcome) -> i32 {
        let reply = outcome.reply.as_ref().expect("expected a reply");
        assert_eq!(reply.opcode, Opcode::Nack);
        NackPacket::from_bytes(&reply.payload).unwrap().err
    }

    #[test]
    fn test_short_frame_is_dropped_silently() {
        let mut rig = rig("short-frame");
        let outcome = rig.engine.handle_frame(&[0x02, 0x00, 0x00]);
        assert!(outcome.reply.is_none());
        assert_eq!(outcome.action, Action::None);
    }

    #[test]
    fn test_length_mismatch_nacks_invalid_size() {
        let mut rig = rig("len-mismatch");
        // PING header claiming 4 payload bytes, but none follow.
        let mut body = Packet::new(Opcode::Ping, Vec::new()).to_wire();
        body[3] = 4;
        let outcome = rig.engine.handle_frame(&body);
        assert_eq!(nack_code(&outcome), ErrorCode::InvalidSize.code());
    }

    #[test]
    fn test_crc_corruption_nacks_zero() {
        let mut rig = rig("crc-corrupt");
        let mut body = Packet::new(Opcode::Ping, Vec::new()).to_wire();
        // Flip one bit inside the header.
        body[1] ^= 0x10;
        let outcome = rig.engine.handle_frame(&body);
        assert_eq!(nack_code(&outcome), 0);
    }

    #[test]
    fn test_payload_bit_flip_nacks_and_skips_handler() {
        let mut rig = rig("payload-flip");
        let mut body =
            Packet::new(Opcode::OtaChunk, vec![0xAA, 0xBB, 0xCC]).to_wire();
        let last = body.len() - 1;
        body[last] ^= 0x01;
        let outcome = rig.engine.handle_frame(&body);
        assert_eq!(nack_code(&outcome), 0);
        // The corrupt chunk never reached the updater.
        assert!(rig.updater.written().is_empty());
    }

    #[test]
    fn test_unknown_opcode_nacks() {
        let mut rig = rig("unknown-op");
        let mut header = PacketHeader {
            opcode: 0x66,
            crc: 0,
            len: 0,
        };
        header.crc = crc16_chained(&header.to_bytes(), &[]);
        let outcome = rig.engine.handle_frame(&header.to_bytes());
        assert_eq!(nack_code(&outcome), ErrorCode::UnknownOpcode.code());
    }

    #[test]
    fn test_reply_opcode_as_request_nacks() {
        let mut rig = rig("reply-op");
        let outcome = rig
            .engine
            .handle_frame(&Packet::new(Opcode::Ack, Vec::new()).to_wire());
        assert_eq!(nack_code(&outcome), ErrorCode::UnknownOpcode.code());
    }

    #[test]
    fn test_resolve_path_sandbox() {
        let rig = rig("resolve");
        let ok = rig.engine.resolve_path("/etc/app.conf").unwrap();
        assert!(ok.starts_with(&rig.root));
        assert!(ok.ends_with("etc/app.conf"));

        assert!(rig.engine.resolve_path("../escape").is_err());
        assert!(rig.engine.resolve_path("a/../../escape").is_err());
        assert!(rig.engine.resolve_path("").is_err());
        assert!(rig.engine.resolve_path("/").is_err());
    }
}
