//! Curl-P-81 sponge and tryte/trit conversion.
//!
//! Trits are stored one per `i8` with values -1, 0 and 1. Trytes are the
//! characters of [`TRYTE_ALPHABET`], three little-endian trits each.

use powsrv_frame::TRYTE_ALPHABET;

/// Hash length in trits.
pub const HASH_LENGTH: usize = 243;
/// Sponge state length in trits.
pub const STATE_LENGTH: usize = 3 * HASH_LENGTH;
/// Permutation rounds of Curl-P-81.
pub const NUMBER_OF_ROUNDS: usize = 81;
/// Length of a transaction in trytes.
pub const TRANSACTION_TRYTES: usize = 2673;
/// Length of the nonce at the end of a transaction, in trytes.
pub const NONCE_TRYTES: usize = 27;

const TRUTH_TABLE: [i8; 11] = [1, 0, -1, 2, 1, -1, 0, 2, -1, 1, 0];

/// Curl-P-81 sponge.
#[derive(Clone)]
pub struct Curl {
    state: [i8; STATE_LENGTH],
}

impl Curl {
    pub fn new() -> Self {
        Self {
            state: [0; STATE_LENGTH],
        }
    }

    /// Absorb `trits` in 243-trit blocks, permuting after each block.
    pub fn absorb(&mut self, trits: &[i8]) {
        for block in trits.chunks(HASH_LENGTH) {
            self.state[..block.len()].copy_from_slice(block);
            self.transform();
        }
    }

    /// Squeeze one 243-trit hash.
    pub fn squeeze(&mut self) -> [i8; HASH_LENGTH] {
        let mut out = [0; HASH_LENGTH];
        out.copy_from_slice(&self.state[..HASH_LENGTH]);
        self.transform();
        out
    }

    /// Apply the permutation.
    pub fn transform(&mut self) {
        let mut scratch = [0i8; STATE_LENGTH];
        let mut index = 0usize;
        for _ in 0..NUMBER_OF_ROUNDS {
            scratch.copy_from_slice(&self.state);
            for trit in self.state.iter_mut() {
                let a = scratch[index];
                index = if index < 365 { index + 364 } else { index - 365 };
                let b = scratch[index];
                *trit = TRUTH_TABLE[(a + (b << 2) + 5) as usize];
            }
        }
    }

    /// The rate part of the state (first 243 trits).
    pub fn rate(&self) -> &[i8] {
        &self.state[..HASH_LENGTH]
    }

    pub(crate) fn rate_mut(&mut self) -> &mut [i8] {
        &mut self.state[..HASH_LENGTH]
    }
}

impl Default for Curl {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert trytes to trits; `None` if a character is not a tryte.
pub fn trytes_to_trits(trytes: &str) -> Option<Vec<i8>> {
    let mut trits = Vec::with_capacity(trytes.len() * 3);
    for byte in trytes.bytes() {
        let index = TRYTE_ALPHABET.iter().position(|&c| c == byte)? as i8;
        let mut value = if index > 13 { index - 27 } else { index };
        for _ in 0..3 {
            let mut trit = value.rem_euclid(3);
            if trit == 2 {
                trit = -1;
            }
            trits.push(trit);
            value = (value - trit) / 3;
        }
    }
    Some(trits)
}

/// Convert trits to trytes. A trailing partial tryte is zero-padded.
pub fn trits_to_trytes(trits: &[i8]) -> String {
    trits
        .chunks(3)
        .map(|chunk| {
            let value = chunk
                .iter()
                .rev()
                .fold(0i8, |acc, &trit| acc * 3 + trit);
            let index = if value < 0 { value + 27 } else { value };
            char::from(TRYTE_ALPHABET[index as usize])
        })
        .collect()
}

/// Curl-P-81 hash of `trytes`, as 81 trytes.
pub fn hash(trytes: &str) -> Option<String> {
    let trits = trytes_to_trits(trytes)?;
    let mut curl = Curl::new();
    curl.absorb(&trits);
    Some(trits_to_trytes(&curl.squeeze()))
}

/// Number of zero trits at the end of `trits`.
pub fn trailing_zeros(trits: &[i8]) -> usize {
    trits.iter().rev().take_while(|&&trit| trit == 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tryte_values() {
        assert_eq!(trytes_to_trits("9").unwrap(), [0, 0, 0]);
        assert_eq!(trytes_to_trits("A").unwrap(), [1, 0, 0]);
        assert_eq!(trytes_to_trits("M").unwrap(), [1, 1, 1]);
        assert_eq!(trytes_to_trits("N").unwrap(), [-1, -1, -1]);
        assert_eq!(trytes_to_trits("Z").unwrap(), [-1, 0, 0]);
        assert!(trytes_to_trits("a").is_none());
    }

    #[test]
    fn every_tryte_survives_trit_conversion() {
        let alphabet = std::str::from_utf8(TRYTE_ALPHABET).unwrap();
        let trits = trytes_to_trits(alphabet).unwrap();
        assert_eq!(trits.len(), 81);
        assert_eq!(trits_to_trytes(&trits), alphabet);
    }

    #[test]
    fn transform_only_produces_trits() {
        let mut curl = Curl::new();
        curl.absorb(&trytes_to_trits("POWSRV").unwrap());
        let squeezed = curl.squeeze();
        assert!(squeezed.iter().all(|t| (-1..=1).contains(t)));
        assert!(squeezed.iter().any(|&t| t != 0));
    }

    #[test]
    fn hash_is_deterministic_and_input_sensitive() {
        let a = hash(&"A".repeat(TRANSACTION_TRYTES)).unwrap();
        let b = hash(&"A".repeat(TRANSACTION_TRYTES)).unwrap();
        let mut other = "A".repeat(TRANSACTION_TRYTES - 1);
        other.push('B');
        let c = hash(&other).unwrap();

        assert_eq!(a.len(), HASH_LENGTH / 3);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn squeeze_advances_state() {
        let mut curl = Curl::new();
        curl.absorb(&trytes_to_trits("9").unwrap());
        let first = curl.squeeze();
        let second = curl.squeeze();
        assert_ne!(first, second);
        assert_eq!(curl.rate().len(), HASH_LENGTH);
    }

    #[test]
    fn counts_trailing_zeros() {
        assert_eq!(trailing_zeros(&[1, 0, -1, 0, 0]), 2);
        assert_eq!(trailing_zeros(&[0, 0]), 2);
        assert_eq!(trailing_zeros(&[1]), 0);
    }
}
