// Per-hop bulk encryption keys
//
// An intermediate hop gets a 32-byte key and a 12-byte partial IV. The full
// IV for slot j is partial[0..4] ‖ j (u32 LE) ‖ partial[4..12]; the body uses
// sequence HOP_MAX.

use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::HOP_MAX;
use crate::crypto::{apply_keystream, STREAM_IV_SIZE, STREAM_KEY_SIZE};

pub(crate) const PARTIAL_IV_SIZE: usize = 12;

/// Sequence number used for the body
pub(crate) const BODY_SEQUENCE: u32 = HOP_MAX as u32;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct HopKeys {
    key: [u8; STREAM_KEY_SIZE],
    partial_iv: [u8; PARTIAL_IV_SIZE],
}

impl HopKeys {
    pub(crate) fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut keys = Self {
            key: [0u8; STREAM_KEY_SIZE],
            partial_iv: [0u8; PARTIAL_IV_SIZE],
        };
        rng.fill_bytes(&mut keys.key);
        rng.fill_bytes(&mut keys.partial_iv);
        keys
    }

    pub(crate) fn new(key: [u8; STREAM_KEY_SIZE], partial_iv: [u8; PARTIAL_IV_SIZE]) -> Self {
        Self { key, partial_iv }
    }

    pub(crate) fn key(&self) -> &[u8; STREAM_KEY_SIZE] {
        &self.key
    }

    pub(crate) fn partial_iv(&self) -> &[u8; PARTIAL_IV_SIZE] {
        &self.partial_iv
    }

    pub(crate) fn iv(&self, sequence: u32) -> [u8; STREAM_IV_SIZE] {
        let mut iv = [0u8; STREAM_IV_SIZE];
        iv[..4].copy_from_slice(&self.partial_iv[..4]);
        iv[4..8].copy_from_slice(&sequence.to_le_bytes());
        iv[8..].copy_from_slice(&self.partial_iv[4..]);
        iv
    }

    /// XOR this hop's keystream for `sequence` into `data`
    pub(crate) fn apply(&self, sequence: u32, data: &mut [u8]) {
        apply_keystream(&self.key, &self.iv(sequence), data);
    }
}

/// Body key for the exit hop: a full random IV, no sequencing
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct ExitKeys {
    key: [u8; STREAM_KEY_SIZE],
    iv: [u8; STREAM_IV_SIZE],
}

impl ExitKeys {
    pub(crate) fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut keys = Self {
            key: [0u8; STREAM_KEY_SIZE],
            iv: [0u8; STREAM_IV_SIZE],
        };
        rng.fill_bytes(&mut keys.key);
        rng.fill_bytes(&mut keys.iv);
        keys
    }

    pub(crate) fn key(&self) -> &[u8; STREAM_KEY_SIZE] {
        &self.key
    }

    pub(crate) fn iv(&self) -> &[u8; STREAM_IV_SIZE] {
        &self.iv
    }

    pub(crate) fn apply(&self, body: &mut [u8]) {
        apply_keystream(&self.key, &self.iv, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iv_layout() {
        let keys = HopKeys::new([0u8; 32], [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(
            keys.iv(0x0403_0201),
            [1, 2, 3, 4, 0x01, 0x02, 0x03, 0x04, 5, 6, 7, 8, 9, 10, 11, 12]
        );
        assert_eq!(keys.iv(BODY_SEQUENCE)[4..8], [10, 0, 0, 0]);
    }

    #[test]
    fn test_sequences_give_distinct_keystreams() {
        let keys = HopKeys::generate(&mut rand::thread_rng());
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        keys.apply(0, &mut a);
        keys.apply(1, &mut b);
        assert_ne!(a, b);

        keys.apply(0, &mut a);
        assert_eq!(a, [0u8; 64]);
    }
}
