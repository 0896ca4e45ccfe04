// Bulk stream cipher — AES-256 in counter mode
//
// Header slots and the body are re-encrypted at every hop with a plain
// keystream: no length expansion, so the packet size never changes.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// AES key size (bytes)
pub const STREAM_KEY_SIZE: usize = 32;

/// Full counter-block IV size (bytes)
pub const STREAM_IV_SIZE: usize = 16;

/// XOR the AES-256-CTR keystream for `(key, iv)` into `data`.
///
/// Encryption and decryption are the same operation.
pub fn apply_keystream(
    key: &[u8; STREAM_KEY_SIZE],
    iv: &[u8; STREAM_IV_SIZE],
    data: &mut [u8],
) {
    let mut cipher = Aes256Ctr::new(&(*key).into(), &(*iv).into());
    cipher.apply_keystream(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keystream_is_involution() {
        let key = [7u8; STREAM_KEY_SIZE];
        let iv = [9u8; STREAM_IV_SIZE];
        let original = b"fixed size packets only".to_vec();

        let mut data = original.clone();
        apply_keystream(&key, &iv, &mut data);
        assert_ne!(data, original);

        apply_keystream(&key, &iv, &mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn test_keystream_depends_on_iv() {
        let key = [1u8; STREAM_KEY_SIZE];
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];

        apply_keystream(&key, &[0u8; STREAM_IV_SIZE], &mut a);
        apply_keystream(&key, &[1u8; STREAM_IV_SIZE], &mut b);

        assert_ne!(a, b);
        assert!(a.iter().any(|&x| x != 0));
    }

    #[test]
    fn test_keystream_matches_known_vector() {
        // NIST SP 800-38A F.5.5 (CTR-AES256.Encrypt), first block
        let key: [u8; 32] = hex::decode(
            "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4",
        )
        .unwrap()
        .try_into()
        .unwrap();
        let iv: [u8; 16] = hex::decode("f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff")
            .unwrap()
            .try_into()
            .unwrap();
        let mut block = hex::decode("6bc1bee22e409f96e93d7e117393172a").unwrap();

        apply_keystream(&key, &iv, &mut block);

        assert_eq!(hex::encode(block), "601ec313775789a5b7a7f504bbf3d228");
    }
}
