//! CRC-8 frame checksum.
//!
//! CRC-8/SMBUS: polynomial `0x07`, init `0x00`, no reflection, no final xor.
//! Covers request id, command and payload; never the sync, version or
//! length bytes.

use crc::{Crc, CRC_8_SMBUS};

static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Checksum of a contiguous byte range.
pub fn checksum(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}
