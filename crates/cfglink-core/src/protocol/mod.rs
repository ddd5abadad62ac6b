//! Protocol module - wire format definitions.

pub mod codec;
pub mod constants;
pub mod crc;
pub mod packet;

pub use codec::{FrameDecoder, encode_frame};
pub use constants::{HEADER_SIZE, MAX_PAYLOAD_SIZE, MAX_PKT_SIZE};
pub use crc::{crc16, crc16_chained};
pub use packet::{
    CfgPacket, ChunkAckPacket, ChunkState, DelCfgPacket, DeviceInfoPacket, ErrorCode,
    FileInfoPacket, NackPacket, Opcode, PacketError, PacketHeader, PathPacket, UptimePacket,
    UptimeRequest,
};
