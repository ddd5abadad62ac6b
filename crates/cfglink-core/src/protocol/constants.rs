//! Wire protocol constants.
//!
//! Every value in this module is an on-wire constant shared with host
//! tooling and must not be renumbered.

// ============================================================================
// Size Constants
// ============================================================================

/// Maximum decoded frame body (header + payload) in bytes.
pub const MAX_PKT_SIZE: usize = 4096;

/// Fixed packet header width: type (u8) + crc (u16) + len (u16).
pub const HEADER_SIZE: usize = 5;

/// Largest payload that fits in one packet.
pub const MAX_PAYLOAD_SIZE: usize = MAX_PKT_SIZE - HEADER_SIZE;

/// Namespace field width in config packets (NUL-padded).
pub const NS_LEN: usize = 16;

/// Key field width in config packets (NUL-padded).
pub const KEY_LEN: usize = 16;

/// Path field width in file packets (NUL-padded).
pub const PATH_LEN: usize = 255;

/// Read granularity for streamed file hashing.
pub const HASH_CHUNK_SIZE: usize = 64;

// ============================================================================
// Framing Sentinels
// ============================================================================

/// Start of frame.
pub const FRAME_START: u8 = 0x5A;

/// End of frame.
pub const FRAME_END: u8 = 0xC0;

/// Escape prefix for literal sentinel bytes in the body.
pub const FRAME_ESC: u8 = 0xDB;

/// `ESC, ESC_END` decodes to a literal `FRAME_END`.
pub const FRAME_ESC_END: u8 = 0xDC;

/// `ESC, ESC_ESC` decodes to a literal `FRAME_ESC`.
pub const FRAME_ESC_ESC: u8 = 0xDD;

/// `ESC, ESC_START` decodes to a literal `FRAME_START`.
pub const FRAME_ESC_START: u8 = 0xDE;
