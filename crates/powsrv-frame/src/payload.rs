//! `PowFunc` request payload: `[min_weight_magnitude] ++ trytes`.

use crate::error::PayloadError;

/// Highest accepted min weight magnitude (the hash length in trits).
pub const MAX_MIN_WEIGHT_MAGNITUDE: u8 = 243;

/// The 27 tryte characters, in value order starting at zero.
pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A decoded `PowFunc` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowRequest {
    /// Difficulty: trailing zero trits required in the hash.
    pub min_weight_magnitude: u8,
    /// Transaction trytes to do PoW on.
    pub trytes: String,
}

impl PowRequest {
    /// Build a request, rejecting an out-of-range difficulty or bad trytes.
    pub fn new(trytes: impl Into<String>, min_weight_magnitude: u8) -> Result<Self, PayloadError> {
        check_min_weight_magnitude(min_weight_magnitude)?;
        let trytes = trytes.into();
        validate_trytes(trytes.as_bytes())?;
        Ok(Self {
            min_weight_magnitude,
            trytes,
        })
    }

    /// Wire payload.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.trytes.len());
        out.push(self.min_weight_magnitude);
        out.extend_from_slice(self.trytes.as_bytes());
        out
    }

    /// Parse and validate a wire payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, PayloadError> {
        let (&min_weight_magnitude, trytes) = payload.split_first().ok_or(PayloadError::Empty)?;
        check_min_weight_magnitude(min_weight_magnitude)?;
        validate_trytes(trytes)?;
        // Validated as ASCII above.
        let trytes = String::from_utf8_lossy(trytes).into_owned();
        Ok(Self {
            min_weight_magnitude,
            trytes,
        })
    }
}

fn check_min_weight_magnitude(value: u8) -> Result<(), PayloadError> {
    if value > MAX_MIN_WEIGHT_MAGNITUDE {
        return Err(PayloadError::DifficultyOutOfRange {
            value: value as u32,
            max: MAX_MIN_WEIGHT_MAGNITUDE,
        });
    }
    Ok(())
}

/// Check that every byte is a tryte character.
pub fn validate_trytes(bytes: &[u8]) -> Result<(), PayloadError> {
    match bytes.iter().position(|b| !TRYTE_ALPHABET.contains(b)) {
        Some(offset) => Err(PayloadError::InvalidTryte {
            offset,
            byte: bytes[offset],
        }),
        None => Ok(()),
    }
}
