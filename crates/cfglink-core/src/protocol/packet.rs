//! Typed packet headers and payload structures.
//!
//! A packet is a 5-byte little-endian header `{type, crc, len}` followed by
//! `len` payload bytes. Payload layouts are fixed-offset packed structures;
//! text fields are NUL-padded to their declared width.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use thiserror::Error;

use super::constants::{HEADER_SIZE, KEY_LEN, NS_LEN, PATH_LEN};
use crate::store::TypeTag;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Declared length {declared} does not match payload ({actual})")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Unknown value type tag 0x{0:02X}")]
    UnknownTypeTag(u8),
    #[error("Unknown chunk state {0}")]
    UnknownChunkState(u8),
}

impl PacketError {
    /// The NACK code a malformed request maps to.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            PacketError::BufferTooSmall { .. } | PacketError::LengthMismatch { .. } => {
                ErrorCode::InvalidSize
            }
            PacketError::UnknownTypeTag(_) | PacketError::UnknownChunkState(_) => {
                ErrorCode::InvalidArg
            }
        }
    }
}

// ============================================================================
// Opcodes
// ============================================================================

/// Packet type codes. Requests are < 0x80, replies >= 0x80.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    GetDeviceInfo = 0x01,
    Ping = 0x02,
    GetUptime = 0x03,
    Reboot = 0x04,
    RebootBootloader = 0x05,
    GetConfig = 0x10,
    SetConfig = 0x11,
    DelConfig = 0x12,
    NukeConfig = 0x13,
    BeginFileWrite = 0x20,
    FileChunk = 0x21,
    GetFileInfo = 0x22,
    DeleteFile = 0x23,
    BeginOta = 0x30,
    OtaChunk = 0x31,
    OtaCommit = 0x32,
    Ack = 0x80,
    ChunkAck = 0x81,
    ConfigResult = 0x82,
    FileInfo = 0x83,
    Uptime = 0x84,
    DevInfo = 0x85,
    Nack = 0xFF,
}

impl Opcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x01 => Opcode::GetDeviceInfo,
            0x02 => Opcode::Ping,
            0x03 => Opcode::GetUptime,
            0x04 => Opcode::Reboot,
            0x05 => Opcode::RebootBootloader,
            0x10 => Opcode::GetConfig,
            0x11 => Opcode::SetConfig,
            0x12 => Opcode::DelConfig,
            0x13 => Opcode::NukeConfig,
            0x20 => Opcode::BeginFileWrite,
            0x21 => Opcode::FileChunk,
            0x22 => Opcode::GetFileInfo,
            0x23 => Opcode::DeleteFile,
            0x30 => Opcode::BeginOta,
            0x31 => Opcode::OtaChunk,
            0x32 => Opcode::OtaCommit,
            0x80 => Opcode::Ack,
            0x81 => Opcode::ChunkAck,
            0x82 => Opcode::ConfigResult,
            0x83 => Opcode::FileInfo,
            0x84 => Opcode::Uptime,
            0x85 => Opcode::DevInfo,
            0xFF => Opcode::Nack,
            _ => return None,
        })
    }

    /// True for reply opcodes the device emits; a host must never send these.
    pub fn is_reply(self) -> bool {
        (self as u8) >= 0x80
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ============================================================================
// Chunk acknowledgement states
// ============================================================================

/// Per-chunk acknowledgement state for chunked transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkState {
    /// Transfer complete; `aux` is the final byte offset.
    XferDone = 0,
    /// Chunk accepted, send the next; `aux` is the running byte offset.
    XferNext = 1,
    /// Payload CRC32 mismatch; `aux` is the expected CRC.
    Crc32Fail = 2,
    /// Subsystem failure; `aux` is the error code.
    Internal = 3,
    /// Host-requested abort acknowledged.
    AbortRequested = 4,
    /// Target name exceeds the wire field.
    NameTooLong = 5,
}

impl ChunkState {
    pub fn from_wire(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => ChunkState::XferDone,
            1 => ChunkState::XferNext,
            2 => ChunkState::Crc32Fail,
            3 => ChunkState::Internal,
            4 => ChunkState::AbortRequested,
            5 => ChunkState::NameTooLong,
            _ => return None,
        })
    }
}

// ============================================================================
// NACK error codes
// ============================================================================

/// Machine-readable error codes carried in `NACK` and in
/// `CHUNK_ACK(INTERNAL, aux)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Frame integrity failure, or unspecified.
    Crc = 0,
    InvalidArg = 1,
    InvalidSize = 2,
    InvalidState = 3,
    NotFound = 4,
    NotSupported = 5,
    Io = 6,
    UnknownOpcode = 7,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

// ============================================================================
// Packet header
// ============================================================================

/// Fixed 5-byte packet header, little-endian.
///
/// The `crc` field is zeroed while the CRC is computed on both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub opcode: u8,
    pub crc: u16,
    pub len: u16,
}

impl PacketHeader {
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(opcode: Opcode, len: u16) -> Self {
        Self {
            opcode: opcode as u8,
            crc: 0,
            len,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.opcode;
        LittleEndian::write_u16(&mut buf[1..3], self.crc);
        LittleEndian::write_u16(&mut buf[3..5], self.len);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            opcode: data[0],
            crc: LittleEndian::read_u16(&data[1..3]),
            len: LittleEndian::read_u16(&data[3..5]),
        })
    }
}

// ============================================================================
// Fixed-width text fields
// ============================================================================

fn put_fixed(out: &mut Vec<u8>, text: &str, width: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

fn take_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ============================================================================
// Config packets
// ============================================================================

/// Config access packet: request payload of `GET_CONFIG`/`SET_CONFIG` and
/// reply payload of `CONFIG_RESULT`.
///
/// Wire layout: `u8 type; u16 val_len; char ns[16]; char key[16];
/// u8 value[val_len]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CfgPacket {
    pub tag: TypeTag,
    pub ns: String,
    pub key: String,
    pub value: Vec<u8>,
}

impl CfgPacket {
    /// Fixed part before the value bytes.
    pub const FIXED_SIZE: usize = 1 + 2 + NS_LEN + KEY_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::FIXED_SIZE + self.value.len());
        buf.push(self.tag.to_wire());
        buf.write_u16::<LittleEndian>(self.value.len() as u16).unwrap();
        put_fixed(&mut buf, &self.ns, NS_LEN);
        put_fixed(&mut buf, &self.key, KEY_LEN);
        buf.extend_from_slice(&self.value);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::FIXED_SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::FIXED_SIZE,
                actual: data.len(),
            });
        }
        let tag = TypeTag::from_wire(data[0]).ok_or(PacketError::UnknownTypeTag(data[0]))?;
        let val_len = LittleEndian::read_u16(&data[1..3]) as usize;
        if data.len() != Self::FIXED_SIZE + val_len {
            return Err(PacketError::LengthMismatch {
                declared: val_len,
                actual: data.len() - Self::FIXED_SIZE,
            });
        }
        let ns = take_fixed(&data[3..3 + NS_LEN]);
        let key = take_fixed(&data[3 + NS_LEN..Self::FIXED_SIZE]);
        Ok(Self {
            tag,
            ns,
            key,
            value: data[Self::FIXED_SIZE..].to_vec(),
        })
    }
}

/// Payload of `DEL_CONFIG` and `NUKE_CONFIG`: `char ns[16]; char key[16]`.
/// `NUKE_CONFIG` ignores the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelCfgPacket {
    pub ns: String,
    pub key: String,
}

impl DelCfgPacket {
    pub const SIZE: usize = NS_LEN + KEY_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        put_fixed(&mut buf, &self.ns, NS_LEN);
        put_fixed(&mut buf, &self.key, KEY_LEN);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            ns: take_fixed(&data[..NS_LEN]),
            key: take_fixed(&data[NS_LEN..Self::SIZE]),
        })
    }
}

// ============================================================================
// File packets
// ============================================================================

/// Payload of `BEGIN_FILE_WRITE`, `GET_FILE_INFO` and `DELETE_FILE`:
/// `u32 len; char path[255]`. Only `BEGIN_FILE_WRITE` uses `len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPacket {
    pub len: u32,
    pub path: String,
}

impl PathPacket {
    pub const SIZE: usize = 4 + PATH_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<LittleEndian>(self.len).unwrap();
        put_fixed(&mut buf, &self.path, PATH_LEN);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            len: LittleEndian::read_u32(&data[..4]),
            path: take_fixed(&data[4..Self::SIZE]),
        })
    }
}

/// Reply payload of `FILE_INFO`: `u32 size; u8 hash[32]` (SHA-256).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfoPacket {
    pub size: u32,
    pub hash: [u8; 32],
}

impl FileInfoPacket {
    pub const SIZE: usize = 4 + 32;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<LittleEndian>(self.size).unwrap();
        buf.extend_from_slice(&self.hash);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&data[4..Self::SIZE]);
        Ok(Self {
            size: LittleEndian::read_u32(&data[..4]),
            hash,
        })
    }
}

// ============================================================================
// Chunk acknowledgement / NACK
// ============================================================================

/// Reply payload of `CHUNK_ACK`: `u8 state; u32 aux`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAckPacket {
    pub state: ChunkState,
    pub aux: u32,
}

impl ChunkAckPacket {
    pub const SIZE: usize = 1 + 4;

    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.state as u8);
        buf.write_u32::<LittleEndian>(self.aux).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let state = ChunkState::from_wire(data[0]).ok_or(PacketError::UnknownChunkState(data[0]))?;
        Ok(Self {
            state,
            aux: LittleEndian::read_u32(&data[1..Self::SIZE]),
        })
    }
}

/// Reply payload of `NACK`: `i32 err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackPacket {
    pub err: i32,
}

impl NackPacket {
    pub const SIZE: usize = 4;

    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_i32::<LittleEndian>(self.err).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            err: LittleEndian::read_i32(&data[..Self::SIZE]),
        })
    }
}

// ============================================================================
// Device management packets
// ============================================================================

/// Request payload of `GET_UPTIME`: `u64 realtime_ms`.
///
/// `0` and `u64::MAX` mean "host has no wall clock, do not set ours".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeRequest {
    pub realtime_ms: u64,
}

impl UptimeRequest {
    pub const SIZE: usize = 8;

    pub fn to_bytes(self) -> Vec<u8> {
        self.realtime_ms.to_le_bytes().to_vec()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() != Self::SIZE {
            return Err(PacketError::LengthMismatch {
                declared: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            realtime_ms: LittleEndian::read_u64(data),
        })
    }
}

/// Reply payload of `UPTIME`: `u8 reset_reason; u64 micros`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimePacket {
    pub reset_reason: u8,
    pub micros: u64,
}

impl UptimePacket {
    pub const SIZE: usize = 1 + 8;

    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.reset_reason);
        buf.write_u64::<LittleEndian>(self.micros).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            reset_reason: data[0],
            micros: LittleEndian::read_u64(&data[1..Self::SIZE]),
        })
    }
}

/// Reply payload of `DEV_INFO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfoPacket {
    pub mac: [u8; 6],
    pub flash_id: [u8; 8],
    pub sdk_version: String,
    pub compile_time: String,
    pub compile_date: String,
    pub model_name: String,
    pub firmware_version: String,
    pub firmware_sha256: [u8; 32],
}

impl DeviceInfoPacket {
    pub const SIZE: usize = 6 + 8 + 16 + 16 + 16 + 32 + 32 + 32;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.mac);
        buf.extend_from_slice(&self.flash_id);
        put_fixed(&mut buf, &self.sdk_version, 16);
        put_fixed(&mut buf, &self.compile_time, 16);
        put_fixed(&mut buf, &self.compile_date, 16);
        put_fixed(&mut buf, &self.model_name, 32);
        put_fixed(&mut buf, &self.firmware_version, 32);
        buf.extend_from_slice(&self.firmware_sha256);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[..6]);
        let mut flash_id = [0u8; 8];
        flash_id.copy_from_slice(&data[6..14]);
        let sdk_version = take_fixed(&data[14..30]);
        let compile_time = take_fixed(&data[30..46]);
        let compile_date = take_fixed(&data[46..62]);
        let model_name = take_fixed(&data[62..94]);
        let firmware_version = take_fixed(&data[94..126]);
        let mut firmware_sha256 = [0u8; 32];
        firmware_sha256.copy_from_slice(&data[126..158]);
        Ok(Self {
            mac,
            flash_id,
            sdk_version,
            compile_time,
            compile_date,
            model_name,
            firmware_version,
            firmware_sha256,
        })
    }
}
