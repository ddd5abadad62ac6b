//! CRC-16/XMODEM integrity checks.
//!
//! Polynomial 0x1021, init 0x0000, no input/output reflection, no xor-out.
//! The packet CRC covers the 5 header bytes (with the `crc` field zeroed)
//! chained into the payload bytes.

use crc::{CRC_16_XMODEM, Crc};

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC over a single contiguous buffer.
pub fn crc16(buf: &[u8]) -> u16 {
    XMODEM.checksum(buf)
}

/// CRC over the header bytes chained into the payload bytes, equivalent to
/// one CRC over their concatenation.
pub fn crc16_chained(header: &[u8], payload: &[u8]) -> u16 {
    let mut digest = XMODEM.digest();
    digest.update(header);
    digest.update(payload);
    digest.finalize()
}
