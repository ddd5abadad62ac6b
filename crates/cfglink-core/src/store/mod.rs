//! Typed key-value configuration store.
//!
//! Values are addressed by a `(namespace, key)` tuple and carry one of ten
//! type tags. Tag values are on-wire constants (NVS-compatible) and must not
//! be renumbered. Fixed-width numeric values travel as their canonical
//! little-endian encoding; strings are NUL-terminated; blobs are raw bytes.

pub mod file;
pub mod mem;

pub use file::TomlStore;
pub use mem::MemStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::packet::ErrorCode;

// ============================================================================
// Type tags
// ============================================================================

/// On-wire value type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    U8 = 0x01,
    I8 = 0x11,
    U16 = 0x02,
    I16 = 0x12,
    U32 = 0x04,
    I32 = 0x14,
    U64 = 0x08,
    I64 = 0x18,
    Str = 0x21,
    Blob = 0x42,
}

impl TypeTag {
    pub fn from_wire(raw: u8) -> Option<Self> {
        Some(match raw {
            0x01 => TypeTag::U8,
            0x11 => TypeTag::I8,
            0x02 => TypeTag::U16,
            0x12 => TypeTag::I16,
            0x04 => TypeTag::U32,
            0x14 => TypeTag::I32,
            0x08 => TypeTag::U64,
            0x18 => TypeTag::I64,
            0x21 => TypeTag::Str,
            0x42 => TypeTag::Blob,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        self as u8
    }

    /// Byte width for fixed-width numeric tags; `None` for `Str`/`Blob`.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            TypeTag::U8 | TypeTag::I8 => Some(1),
            TypeTag::U16 | TypeTag::I16 => Some(2),
            TypeTag::U32 | TypeTag::I32 => Some(4),
            TypeTag::U64 | TypeTag::I64 => Some(8),
            TypeTag::Str | TypeTag::Blob => None,
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    Str(String),
    Blob(Vec<u8>),
}

/// Wire decode failure for a value payload.
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("Value length {actual} does not match type width {expected}")]
    Width { expected: usize, actual: usize },
    #[error("String value is not NUL-terminated within the payload")]
    Unterminated,
    #[error("Blob value must not be empty")]
    EmptyBlob,
    #[error("String value is not valid UTF-8")]
    Encoding,
}

impl ValueError {
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            ValueError::Width { .. } => ErrorCode::InvalidSize,
            ValueError::Unterminated | ValueError::EmptyBlob | ValueError::Encoding => {
                ErrorCode::InvalidArg
            }
        }
    }
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::U8(_) => TypeTag::U8,
            Value::I8(_) => TypeTag::I8,
            Value::U16(_) => TypeTag::U16,
            Value::I16(_) => TypeTag::I16,
            Value::U32(_) => TypeTag::U32,
            Value::I32(_) => TypeTag::I32,
            Value::U64(_) => TypeTag::U64,
            Value::I64(_) => TypeTag::I64,
            Value::Str(_) => TypeTag::Str,
            Value::Blob(_) => TypeTag::Blob,
        }
    }

    /// Canonical wire encoding: little-endian numerics, NUL-terminated
    /// strings, raw blobs.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        match self {
            Value::U8(v) => v.to_le_bytes().to_vec(),
            Value::I8(v) => v.to_le_bytes().to_vec(),
            Value::U16(v) => v.to_le_bytes().to_vec(),
            Value::I16(v) => v.to_le_bytes().to_vec(),
            Value::U32(v) => v.to_le_bytes().to_vec(),
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::U64(v) => v.to_le_bytes().to_vec(),
            Value::I64(v) => v.to_le_bytes().to_vec(),
            Value::Str(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
            Value::Blob(b) => b.clone(),
        }
    }

    /// Decode a wire value of the declared tag. Fixed-width tags require the
    /// exact width; strings require a NUL within the payload; blobs must be
    /// non-empty.
    pub fn from_wire_bytes(tag: TypeTag, bytes: &[u8]) -> Result<Self, ValueError> {
        if let Some(width) = tag.fixed_width()
            && bytes.len() != width
        {
            return Err(ValueError::Width {
                expected: width,
                actual: bytes.len(),
            });
        }
        Ok(match tag {
            TypeTag::U8 => Value::U8(bytes[0]),
            TypeTag::I8 => Value::I8(bytes[0] as i8),
            TypeTag::U16 => Value::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            TypeTag::I16 => Value::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
            TypeTag::U32 => Value::U32(u32::from_le_bytes(bytes.try_into().unwrap())),
            TypeTag::I32 => Value::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
            TypeTag::U64 => Value::U64(u64::from_le_bytes(bytes.try_into().unwrap())),
            TypeTag::I64 => Value::I64(i64::from_le_bytes(bytes.try_into().unwrap())),
            TypeTag::Str => {
                let nul = bytes
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(ValueError::Unterminated)?;
                let text =
                    std::str::from_utf8(&bytes[..nul]).map_err(|_| ValueError::Encoding)?;
                Value::Str(text.to_owned())
            }
            TypeTag::Blob => {
                if bytes.is_empty() {
                    return Err(ValueError::EmptyBlob);
                }
                Value::Blob(bytes.to_vec())
            }
        })
    }
}

// ============================================================================
// Store interface
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Item not found: {ns}:{key}")]
    NotFound { ns: String, key: String },
    #[error("Type mismatch for {ns}:{key}: stored {stored:?}, requested {requested:?}")]
    TypeMismatch {
        ns: String,
        key: String,
        stored: TypeTag,
        requested: TypeTag,
    },
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Store serialization error: {0}")]
    Serialize(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// The NACK code a failed store operation maps to.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound { .. } => ErrorCode::NotFound,
            StoreError::TypeMismatch { .. } => ErrorCode::InvalidArg,
            StoreError::Backend(_) | StoreError::Serialize(_) | StoreError::Io(_) => ErrorCode::Io,
        }
    }
}

/// Persistent typed key-value store, addressed by `(namespace, key)`.
///
/// Writes persist without an explicit `commit`; `commit` only guarantees
/// that previously buffered mutations reached the backing medium.
pub trait ConfigStore: Send {
    /// Read a value; the stored tag must match the requested tag.
    fn get(&self, ns: &str, key: &str, tag: TypeTag) -> Result<Value, StoreError>;

    /// Create or replace a value.
    fn set(&mut self, ns: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Erase a single item.
    fn erase(&mut self, ns: &str, key: &str) -> Result<(), StoreError>;

    /// Erase every item in a namespace.
    fn erase_all(&mut self, ns: &str) -> Result<(), StoreError>;

    /// Flush buffered mutations.
    fn commit(&mut self) -> Result<(), StoreError>;
}
